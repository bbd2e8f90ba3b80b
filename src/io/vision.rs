//! Detection feed over the vision sidecar
//!
//! The detector process (camera + model) streams detections as JSON lines
//! over TCP: one detection object per line, an empty line terminates a
//! frame batch. This module owns the connection, filters by confidence
//! threshold, and applies the reconnect policy: release the connection,
//! back off, reacquire, give up after a bounded number of consecutive
//! failures.

use crate::domain::types::DetectionEvent;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Timeout for establishing the sidecar connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Terminal failure of the detection feed
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("vision feed unavailable: {0}")]
    Unavailable(String),
}

/// Where detections come from
pub enum VisionSource {
    /// Detector sidecar speaking JSON lines over TCP
    Tcp { addr: String },
    /// Scripted frame batches for tests
    #[cfg(test)]
    Scripted(FrameScript),
}

impl VisionSource {
    pub fn tcp(addr: &str) -> Self {
        VisionSource::Tcp { addr: addr.to_string() }
    }

    async fn acquire(&self) -> std::io::Result<VisionConn> {
        match self {
            VisionSource::Tcp { addr } => {
                let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
                    .await
                    .map_err(|_| {
                        std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
                    })??;
                info!(addr = %addr, "vision_connected");
                Ok(VisionConn::Tcp(BufReader::new(stream)))
            }
            #[cfg(test)]
            VisionSource::Scripted(script) => Ok(VisionConn::Scripted(script.clone())),
        }
    }
}

enum VisionConn {
    Tcp(BufReader<TcpStream>),
    #[cfg(test)]
    Scripted(FrameScript),
}

/// One step of a scripted feed: a frame batch or an injected failure.
/// The script is shared so it survives release/reacquire cycles.
#[cfg(test)]
#[derive(Debug)]
pub enum ScriptStep {
    Frame(Vec<DetectionEvent>),
    Fail(String),
}

#[cfg(test)]
pub type FrameScript = Arc<parking_lot::Mutex<std::collections::VecDeque<ScriptStep>>>;

#[cfg(test)]
pub fn frame_script(steps: Vec<ScriptStep>) -> FrameScript {
    Arc::new(parking_lot::Mutex::new(steps.into()))
}

/// Pull-based detection feed with threshold filtering and bounded reconnects
pub struct DetectionFeed {
    source: VisionSource,
    conn: Option<VisionConn>,
    confidence_threshold: f32,
    frame_interval: Duration,
    reconnect_attempts: u32,
    reconnect_backoff: Duration,
    consecutive_failures: u32,
    metrics: Arc<Metrics>,
}

impl DetectionFeed {
    pub fn new(config: &Config, source: VisionSource, metrics: Arc<Metrics>) -> Self {
        Self {
            source,
            conn: None,
            confidence_threshold: config.confidence_threshold(),
            frame_interval: Duration::from_millis(config.frame_interval_ms()),
            reconnect_attempts: config.reconnect_attempts(),
            reconnect_backoff: Duration::from_millis(config.reconnect_backoff_ms()),
            consecutive_failures: 0,
            metrics,
        }
    }

    /// Poll the next frame batch, filtered by the confidence threshold.
    ///
    /// May block up to one frame interval. Transient backend failures are
    /// retried internally (release, back off, reacquire); only after the
    /// reconnect budget is spent does this return `FeedError::Unavailable`.
    pub async fn poll(&mut self) -> Result<Vec<DetectionEvent>, FeedError> {
        loop {
            if self.conn.is_none() {
                match self.source.acquire().await {
                    Ok(conn) => self.conn = Some(conn),
                    Err(e) => {
                        self.back_off(&e.to_string()).await?;
                        continue;
                    }
                }
            }

            let frame_interval = self.frame_interval;
            let Some(conn) = self.conn.as_mut() else {
                continue;
            };
            match Self::read_frame(conn, frame_interval).await {
                Ok(mut events) => {
                    self.consecutive_failures = 0;
                    events.retain(|e| e.confidence > self.confidence_threshold);
                    return Ok(events);
                }
                Err(e) => {
                    // Release before any reacquire attempt; the connection
                    // is owned exclusively and never doubled up.
                    self.release();
                    self.back_off(&e.to_string()).await?;
                }
            }
        }
    }

    /// Drop the current connection, if any
    pub fn release(&mut self) {
        if self.conn.take().is_some() {
            info!("vision_released");
        }
    }

    async fn back_off(&mut self, reason: &str) -> Result<(), FeedError> {
        self.consecutive_failures += 1;
        self.metrics.record_feed_reconnect();

        if self.consecutive_failures > self.reconnect_attempts {
            warn!(
                attempts = %self.reconnect_attempts,
                reason = %reason,
                "vision_reconnect_exhausted"
            );
            return Err(FeedError::Unavailable(reason.to_string()));
        }

        warn!(
            attempt = %self.consecutive_failures,
            max = %self.reconnect_attempts,
            reason = %reason,
            "vision_reconnecting"
        );
        tokio::time::sleep(self.reconnect_backoff).await;
        Ok(())
    }

    async fn read_frame(
        conn: &mut VisionConn,
        frame_interval: Duration,
    ) -> std::io::Result<Vec<DetectionEvent>> {
        match conn {
            VisionConn::Tcp(reader) => {
                let mut events = Vec::new();
                let mut line = String::new();
                loop {
                    line.clear();
                    match tokio::time::timeout(frame_interval, reader.read_line(&mut line)).await {
                        // Frame interval elapsed with no terminator; hand
                        // back what arrived so far.
                        Err(_) => return Ok(events),
                        Ok(Ok(0)) => {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "vision stream closed",
                            ));
                        }
                        Ok(Ok(_)) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                return Ok(events);
                            }
                            match serde_json::from_str::<DetectionEvent>(trimmed) {
                                Ok(event) => events.push(event),
                                Err(e) => {
                                    warn!(error = %e, line = %trimmed, "vision_bad_detection_line");
                                }
                            }
                        }
                        Ok(Err(e)) => return Err(e),
                    }
                }
            }
            #[cfg(test)]
            VisionConn::Scripted(script) => {
                let step = script.lock().pop_front();
                match step {
                    Some(ScriptStep::Frame(events)) => Ok(events),
                    Some(ScriptStep::Fail(reason)) => {
                        Err(std::io::Error::new(std::io::ErrorKind::Other, reason))
                    }
                    // Script exhausted: quiet frames from here on
                    None => Ok(Vec::new()),
                }
            }
        }
    }
}
