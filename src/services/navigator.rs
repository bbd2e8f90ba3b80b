//! Aisle navigation loop
//!
//! Drives the cart forward, watches the sonar for the end-of-aisle wall,
//! and performs the lane-change maneuver into the next aisle. Turn
//! direction is fixed: always right. The navigator is the sole authority
//! for run completion (all items found, or the aisle bound reached) and
//! the only writer of the aisle cursor.

use crate::domain::types::{Aisle, WallReading};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::motor::MotorController;
use crate::io::sonar::{Sonar, SonarError};
use crate::services::registry::WantedItemRegistry;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, warn};

/// Current aisle index, shared between the navigator (writer) and the
/// detection loop (reader). 1-based, monotonically non-decreasing within
/// a run.
pub struct AisleCursor(AtomicU32);

impl AisleCursor {
    pub fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    #[inline]
    pub fn current(&self) -> Aisle {
        Aisle(self.0.load(Ordering::Acquire))
    }

    /// Move to the next aisle; called only from the turn transition
    pub fn advance(&self) -> Aisle {
        Aisle(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Back to aisle 1 for a new run
    pub fn reset(&self) {
        self.0.store(1, Ordering::Release);
    }
}

impl Default for AisleCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// How the navigation loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEnd {
    /// Registry emptied: every wanted item was found
    AllFound,
    /// Aisle bound reached with items still wanted
    Exhausted,
    /// Cooperative cancellation (user stop)
    Cancelled,
}

impl NavEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavEnd::AllFound => "all_found",
            NavEnd::Exhausted => "exhausted",
            NavEnd::Cancelled => "cancelled",
        }
    }
}

/// Maneuver dwell times, mirroring the physical turn sequence
struct ManeuverTimings {
    pre_turn_pause: Duration,
    pivot: Duration,
    lane_change: Duration,
    settle: Duration,
    found_pause: Duration,
}

impl ManeuverTimings {
    fn from_config(config: &Config) -> Self {
        Self {
            pre_turn_pause: Duration::from_millis(config.pre_turn_pause_ms()),
            pivot: Duration::from_millis(config.pivot_ms()),
            lane_change: Duration::from_millis(config.lane_change_ms()),
            settle: Duration::from_millis(config.settle_ms()),
            found_pause: Duration::from_millis(config.found_pause_ms()),
        }
    }
}

pub struct Navigator {
    motor: Arc<MotorController>,
    sonar: Sonar,
    registry: Arc<WantedItemRegistry>,
    cursor: Arc<AisleCursor>,
    /// Set by the detection loop when an item is found; the navigator
    /// pauses briefly so the camera keeps a stable view.
    found_pulse: Arc<AtomicBool>,
    max_aisles: u32,
    poll_interval: Duration,
    timings: ManeuverTimings,
    metrics: Arc<Metrics>,
}

impl Navigator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        motor: Arc<MotorController>,
        sonar: Sonar,
        registry: Arc<WantedItemRegistry>,
        cursor: Arc<AisleCursor>,
        found_pulse: Arc<AtomicBool>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            motor,
            sonar,
            registry,
            cursor,
            found_pulse,
            max_aisles: config.max_aisles(),
            poll_interval: Duration::from_millis(config.sonar_poll_interval_ms()),
            timings: ManeuverTimings::from_config(config),
            metrics,
        }
    }

    /// Run the navigation loop until completion, cancellation or a
    /// sensor fault. The wheels are halted on every exit path.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<NavEnd, SonarError> {
        info!(max_aisles = %self.max_aisles, "navigator_started");

        let result = self.drive(&mut shutdown).await;

        // Idempotent halt on every exit path, fault included
        self.motor.stop().await;

        match &result {
            Ok(end) => {
                info!(end = %end.as_str(), aisle = %self.cursor.current(), "navigator_stopped")
            }
            Err(e) => warn!(error = %e, "navigator_fault"),
        }
        result
    }

    async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<NavEnd, SonarError> {
        let mut poll_timer = interval(self.poll_interval);

        self.motor.forward().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("navigator_shutdown");
                        return Ok(NavEnd::Cancelled);
                    }
                }
                _ = poll_timer.tick() => {}
            }

            if self.registry.is_empty() {
                info!(aisle = %self.cursor.current(), "all_items_found_mid_aisle");
                return Ok(NavEnd::AllFound);
            }

            if self.found_pulse.swap(false, Ordering::AcqRel) {
                self.motor.stop().await;
                tokio::time::sleep(self.timings.found_pause).await;
                self.motor.forward().await;
                // Re-check the registry before reading the sonar: the
                // found item may have been the last one.
                continue;
            }

            match self.sonar.poll().await? {
                WallReading::Clear => {}
                WallReading::Blocked => {
                    let aisle = self.cursor.current();
                    info!(aisle = %aisle, "wall_detected");

                    if aisle.0 >= self.max_aisles {
                        // End of the last aisle: nothing left to turn into
                        return Ok(NavEnd::Exhausted);
                    }

                    self.turn_into_next_aisle().await;
                    self.metrics.record_turn();
                    let aisle = self.cursor.advance();
                    info!(aisle = %aisle, "aisle_entered");

                    if self.registry.is_empty() {
                        return Ok(NavEnd::AllFound);
                    }

                    self.motor.forward().await;
                }
            }
        }
    }

    /// Fixed-direction lane change: pivot right, cross into the next
    /// aisle, pivot right again. Dwells approximate the physical
    /// maneuver time.
    async fn turn_into_next_aisle(&self) {
        self.motor.stop().await;
        tokio::time::sleep(self.timings.pre_turn_pause).await;

        self.motor.turn_right().await;
        tokio::time::sleep(self.timings.pivot).await;

        self.motor.forward().await;
        tokio::time::sleep(self.timings.lane_change).await;

        self.motor.turn_right().await;
        tokio::time::sleep(self.timings.pivot).await;

        self.motor.stop().await;
        tokio::time::sleep(self.timings.settle).await;
    }
}
