//! Detection loop
//!
//! Polls the vision feed once per frame interval and reconciles the
//! detections against the wanted-item registry: the first matching
//! detection of a wanted label removes it, records its aisle and raises
//! the found notification, all keyed off the single registry mutex so a
//! concurrent UI removal can never double-fire. Labels that are not
//! wanted, or were already found earlier in the run, are ignored.

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::notifier::NotifierSender;
use crate::io::vision::{DetectionFeed, FeedError};
use crate::services::locations::AisleLocationRecorder;
use crate::services::navigator::AisleCursor;
use crate::services::registry::{RemoveOutcome, WantedItemRegistry};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

pub struct Scanner {
    feed: DetectionFeed,
    registry: Arc<WantedItemRegistry>,
    recorder: Arc<AisleLocationRecorder>,
    cursor: Arc<AisleCursor>,
    found_pulse: Arc<AtomicBool>,
    notifier: NotifierSender,
    frame_interval: Duration,
    metrics: Arc<Metrics>,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        feed: DetectionFeed,
        registry: Arc<WantedItemRegistry>,
        recorder: Arc<AisleLocationRecorder>,
        cursor: Arc<AisleCursor>,
        found_pulse: Arc<AtomicBool>,
        notifier: NotifierSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            feed,
            registry,
            recorder,
            cursor,
            found_pulse,
            notifier,
            frame_interval: Duration::from_millis(config.frame_interval_ms()),
            metrics,
        }
    }

    /// Run the detection loop until cancelled or the feed is declared
    /// gone. The feed connection is released before the loop fully stops.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), FeedError> {
        info!("scanner_started");

        let result = self.scan(&mut shutdown).await;
        self.feed.release();

        match &result {
            Ok(()) => info!("scanner_stopped"),
            Err(e) => info!(error = %e, "scanner_fault"),
        }
        result
    }

    async fn scan(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), FeedError> {
        let mut frame_timer = interval(self.frame_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scanner_shutdown");
                        return Ok(());
                    }
                }
                _ = frame_timer.tick() => {}
            }

            // Nothing left to match: park until cancelled. The navigator
            // owns run completion.
            if self.registry.is_empty() {
                continue;
            }

            let poll_start = Instant::now();
            let events = self.feed.poll().await?;
            self.metrics.record_frame_polled(poll_start.elapsed().as_micros() as u64);

            if events.is_empty() {
                continue;
            }
            self.metrics.record_detections(events.len() as u64);

            // Labels that already triggered a removal in this poll; a
            // frame with two Coke cans still checks off Coke once.
            let mut matched: SmallVec<[&str; 4]> = SmallVec::new();

            for event in &events {
                if matched.iter().any(|label| *label == event.label.as_str()) {
                    debug!(label = %event.label, "detection_repeat_in_frame");
                    continue;
                }

                match self.registry.remove(&event.label) {
                    RemoveOutcome::NotFound => {
                        // Not wanted, or already found earlier in the run
                        debug!(label = %event.label, "detection_not_wanted");
                    }
                    RemoveOutcome::Removed => {
                        let aisle = self.cursor.current();
                        self.recorder.record_if_absent(&event.label, aisle);
                        self.notifier.item_found(&event.label, aisle);
                        self.found_pulse.store(true, Ordering::Release);
                        self.metrics.record_item_found();
                        matched.push(event.label.as_str());
                        info!(
                            item = %event.label,
                            aisle = %aisle,
                            confidence = %format!("{:.2}", event.confidence),
                            "item_found"
                        );
                    }
                }
            }

            if !matched.is_empty() {
                self.notifier.cart_changed(self.registry.snapshot());
            }
        }
    }
}
