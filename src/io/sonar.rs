//! Ultrasonic obstacle sensing
//!
//! The sensor board prints one distance sample per line (centimeters,
//! ASCII decimal) over serial. Each navigator cycle polls the latest
//! sample and thresholds it into a `WallReading`. Timeouts simply mean
//! no fresh sample this cycle and read as clear; garbage lines and IO
//! errors count against a consecutive-failure budget, after which the
//! sensor is declared gone.

use crate::domain::types::WallReading;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

/// Per-poll wait for a fresh sample before falling back to clear
const READ_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum SonarError {
    #[error("obstacle sensor unavailable: {0}")]
    Gone(String),
}

/// Where wall readings come from
pub enum SonarSource {
    Serial { device: String, baud: u32 },
    #[cfg(test)]
    Scripted(WallScript),
}

impl SonarSource {
    pub fn serial(config: &Config) -> Self {
        SonarSource::Serial {
            device: config.sonar_device().to_string(),
            baud: config.sonar_baud(),
        }
    }
}

enum SonarLink {
    Serial(BufReader<tokio_serial::SerialStream>),
    #[cfg(test)]
    Scripted(WallScript),
}

/// One step of a scripted sensor. The final step repeats forever so a
/// single `Distance` entry can model an endless corridor or wall.
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum SonarStep {
    Distance(u32),
    ReadError(String),
}

#[cfg(test)]
pub type WallScript = Arc<parking_lot::Mutex<std::collections::VecDeque<SonarStep>>>;

#[cfg(test)]
pub fn wall_script(steps: Vec<SonarStep>) -> WallScript {
    Arc::new(parking_lot::Mutex::new(steps.into()))
}

pub struct Sonar {
    link: SonarLink,
    threshold_cm: u32,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    metrics: Arc<Metrics>,
}

impl Sonar {
    /// Acquire the sensor for one run. The port is owned exclusively by
    /// the navigator and released when the navigator loop exits.
    pub fn open(config: &Config, source: SonarSource, metrics: Arc<Metrics>) -> Result<Self, SonarError> {
        let link = match source {
            SonarSource::Serial { device, baud } => {
                let port = tokio_serial::new(&device, baud)
                    .open_native_async()
                    .map_err(|e| SonarError::Gone(format!("{}: {}", device, e)))?;
                info!(device = %device, baud = %baud, "sonar_port_opened");
                SonarLink::Serial(BufReader::new(port))
            }
            #[cfg(test)]
            SonarSource::Scripted(script) => SonarLink::Scripted(script),
        };

        Ok(Self {
            link,
            threshold_cm: config.wall_threshold_cm(),
            max_consecutive_failures: config.sonar_max_consecutive_failures(),
            consecutive_failures: 0,
            metrics,
        })
    }

    /// Poll one wall reading.
    ///
    /// A cycle without a fresh sample reads as clear; bad reads are
    /// retried up to the failure budget before the sensor is declared
    /// gone.
    pub async fn poll(&mut self) -> Result<WallReading, SonarError> {
        match self.read_sample().await {
            Ok(Some(distance_cm)) => {
                self.consecutive_failures = 0;
                let reading = WallReading::from_distance_cm(distance_cm, self.threshold_cm);
                // Routine polls stay at trace; wall handling logs at info
                tracing::trace!(distance_cm = %distance_cm, reading = %reading.as_str(), "sonar_poll");
                Ok(reading)
            }
            Ok(None) => Ok(WallReading::Clear),
            Err(reason) => {
                self.consecutive_failures += 1;
                self.metrics.record_sonar_read_error();
                if self.consecutive_failures > self.max_consecutive_failures {
                    warn!(
                        failures = %self.consecutive_failures,
                        reason = %reason,
                        "sonar_failure_budget_exhausted"
                    );
                    return Err(SonarError::Gone(reason));
                }
                warn!(
                    failures = %self.consecutive_failures,
                    max = %self.max_consecutive_failures,
                    reason = %reason,
                    "sonar_read_failed"
                );
                Ok(WallReading::Clear)
            }
        }
    }

    /// Read one sample: Ok(Some(cm)), Ok(None) on timeout, Err on a bad read
    async fn read_sample(&mut self) -> Result<Option<u32>, String> {
        match &mut self.link {
            SonarLink::Serial(reader) => {
                let mut line = String::new();
                match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
                    Err(_) => Ok(None),
                    Ok(Ok(0)) => Err("sensor stream closed".to_string()),
                    Ok(Ok(_)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            return Ok(None);
                        }
                        trimmed
                            .parse::<u32>()
                            .map(Some)
                            .map_err(|_| format!("unparseable sample {:?}", trimmed))
                    }
                    Ok(Err(e)) => Err(e.to_string()),
                }
            }
            #[cfg(test)]
            SonarLink::Scripted(script) => {
                let step = {
                    let mut steps = script.lock();
                    if steps.len() > 1 {
                        steps.pop_front()
                    } else {
                        steps.front().cloned()
                    }
                };
                match step {
                    Some(SonarStep::Distance(cm)) => Ok(Some(cm)),
                    Some(SonarStep::ReadError(reason)) => Err(reason),
                    None => Ok(None),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted_sonar(steps: Vec<SonarStep>) -> Sonar {
        let config = Config::default();
        Sonar::open(&config, SonarSource::Scripted(wall_script(steps)), Arc::new(Metrics::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_thresholding() {
        let mut sonar = scripted_sonar(vec![SonarStep::Distance(80), SonarStep::Distance(5)]);
        assert_eq!(sonar.poll().await.unwrap(), WallReading::Clear);
        assert_eq!(sonar.poll().await.unwrap(), WallReading::Blocked);
    }

    #[tokio::test]
    async fn test_final_step_repeats() {
        let mut sonar = scripted_sonar(vec![SonarStep::Distance(5)]);
        for _ in 0..3 {
            assert_eq!(sonar.poll().await.unwrap(), WallReading::Blocked);
        }
    }

    #[tokio::test]
    async fn test_bad_reads_within_budget_read_clear() {
        let mut sonar = scripted_sonar(vec![
            SonarStep::ReadError("noise".to_string()),
            SonarStep::Distance(5),
        ]);
        assert_eq!(sonar.poll().await.unwrap(), WallReading::Clear);
        assert_eq!(sonar.poll().await.unwrap(), WallReading::Blocked);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_terminal() {
        let mut sonar = scripted_sonar(vec![SonarStep::ReadError("unplugged".to_string())]);
        // The single error step repeats; drain the budget plus one.
        let budget = Config::default().sonar_max_consecutive_failures();
        for _ in 0..budget {
            assert!(sonar.poll().await.is_ok());
        }
        assert!(matches!(sonar.poll().await, Err(SonarError::Gone(_))));
    }
}
