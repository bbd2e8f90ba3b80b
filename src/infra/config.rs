//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument,
//! defaulting to config/dev.toml. A missing or malformed file falls
//! back to built-in defaults with a warning.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    /// Address of the detector sidecar (JSON lines over TCP)
    pub addr: String,
    /// Minimum confidence for a detection to count
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Nominal frame interval between polls
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Consecutive reconnect attempts before the feed is declared gone
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Backoff between release and reacquire
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

fn default_confidence_threshold() -> f32 {
    0.70
}

fn default_frame_interval_ms() -> u64 {
    30
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotorConfig {
    pub device: String,
    pub baud: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SonarConfig {
    pub device: String,
    pub baud: u32,
    #[serde(default = "default_sonar_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Distance at or below which the path counts as blocked
    #[serde(default = "default_wall_threshold_cm")]
    pub wall_threshold_cm: u32,
    /// Consecutive bad reads before the sensor is declared gone
    #[serde(default = "default_sonar_max_failures")]
    pub max_consecutive_failures: u32,
}

fn default_sonar_poll_interval_ms() -> u64 {
    100
}

fn default_wall_threshold_cm() -> u32 {
    10
}

fn default_sonar_max_failures() -> u32 {
    20
}

/// Maneuver timings for the turn sequence and detection pause
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    #[serde(default = "default_pre_turn_pause_ms")]
    pub pre_turn_pause_ms: u64,
    #[serde(default = "default_pivot_ms")]
    pub pivot_ms: u64,
    #[serde(default = "default_lane_change_ms")]
    pub lane_change_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_found_pause_ms")]
    pub found_pause_ms: u64,
}

fn default_pre_turn_pause_ms() -> u64 {
    500
}

fn default_pivot_ms() -> u64 {
    500
}

fn default_lane_change_ms() -> u64 {
    1500
}

fn default_settle_ms() -> u64 {
    500
}

fn default_found_pause_ms() -> u64 {
    2000
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            pre_turn_pause_ms: default_pre_turn_pause_ms(),
            pivot_ms: default_pivot_ms(),
            lane_change_ms: default_lane_change_ms(),
            settle_ms: default_settle_ms(),
            found_pause_ms: default_found_pause_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_aisles")]
    pub max_aisles: u32,
}

fn default_max_aisles() -> u32 {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_aisles: default_max_aisles() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_command_listener_enabled")]
    pub listener_enabled: bool,
    #[serde(default = "default_command_listener_port")]
    pub listener_port: u16,
}

fn default_command_listener_enabled() -> bool {
    true
}

fn default_command_listener_port() -> u16 {
    65432
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            listener_enabled: default_command_listener_enabled(),
            listener_port: default_command_listener_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_capacity")]
    pub channel_capacity: usize,
}

fn default_notify_capacity() -> usize {
    256
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { channel_capacity: default_notify_capacity() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub vision: VisionConfig,
    pub motor: MotorConfig,
    pub sonar: SonarConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    vision_addr: String,
    confidence_threshold: f32,
    frame_interval_ms: u64,
    reconnect_attempts: u32,
    reconnect_backoff_ms: u64,
    motor_device: String,
    motor_baud: u32,
    sonar_device: String,
    sonar_baud: u32,
    sonar_poll_interval_ms: u64,
    wall_threshold_cm: u32,
    sonar_max_consecutive_failures: u32,
    pre_turn_pause_ms: u64,
    pivot_ms: u64,
    lane_change_ms: u64,
    settle_ms: u64,
    found_pause_ms: u64,
    max_aisles: u32,
    command_listener_enabled: bool,
    command_listener_port: u16,
    notify_capacity: usize,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vision_addr: "127.0.0.1:8600".to_string(),
            confidence_threshold: 0.70,
            frame_interval_ms: 30,
            reconnect_attempts: 5,
            reconnect_backoff_ms: 1000,
            motor_device: "/dev/ttyACM0".to_string(),
            motor_baud: 9600,
            sonar_device: "/dev/ttyACM1".to_string(),
            sonar_baud: 9600,
            sonar_poll_interval_ms: 100,
            wall_threshold_cm: 10,
            sonar_max_consecutive_failures: 20,
            pre_turn_pause_ms: 500,
            pivot_ms: 500,
            lane_change_ms: 1500,
            settle_ms: 500,
            found_pause_ms: 2000,
            max_aisles: 5,
            command_listener_enabled: true,
            command_listener_port: 65432,
            notify_capacity: 256,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            vision_addr: toml_config.vision.addr,
            confidence_threshold: toml_config.vision.confidence_threshold,
            frame_interval_ms: toml_config.vision.frame_interval_ms,
            reconnect_attempts: toml_config.vision.reconnect_attempts,
            reconnect_backoff_ms: toml_config.vision.reconnect_backoff_ms,
            motor_device: toml_config.motor.device,
            motor_baud: toml_config.motor.baud,
            sonar_device: toml_config.sonar.device,
            sonar_baud: toml_config.sonar.baud,
            sonar_poll_interval_ms: toml_config.sonar.poll_interval_ms,
            wall_threshold_cm: toml_config.sonar.wall_threshold_cm,
            sonar_max_consecutive_failures: toml_config.sonar.max_consecutive_failures,
            pre_turn_pause_ms: toml_config.drive.pre_turn_pause_ms,
            pivot_ms: toml_config.drive.pivot_ms,
            lane_change_ms: toml_config.drive.lane_change_ms,
            settle_ms: toml_config.drive.settle_ms,
            found_pause_ms: toml_config.drive.found_pause_ms,
            max_aisles: toml_config.search.max_aisles,
            command_listener_enabled: toml_config.command.listener_enabled,
            command_listener_port: toml_config.command.listener_port,
            notify_capacity: toml_config.notify.channel_capacity,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn vision_addr(&self) -> &str {
        &self.vision_addr
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn frame_interval_ms(&self) -> u64 {
        self.frame_interval_ms
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn reconnect_backoff_ms(&self) -> u64 {
        self.reconnect_backoff_ms
    }

    pub fn motor_device(&self) -> &str {
        &self.motor_device
    }

    pub fn motor_baud(&self) -> u32 {
        self.motor_baud
    }

    pub fn sonar_device(&self) -> &str {
        &self.sonar_device
    }

    pub fn sonar_baud(&self) -> u32 {
        self.sonar_baud
    }

    pub fn sonar_poll_interval_ms(&self) -> u64 {
        self.sonar_poll_interval_ms
    }

    pub fn wall_threshold_cm(&self) -> u32 {
        self.wall_threshold_cm
    }

    pub fn sonar_max_consecutive_failures(&self) -> u32 {
        self.sonar_max_consecutive_failures
    }

    pub fn pre_turn_pause_ms(&self) -> u64 {
        self.pre_turn_pause_ms
    }

    pub fn pivot_ms(&self) -> u64 {
        self.pivot_ms
    }

    pub fn lane_change_ms(&self) -> u64 {
        self.lane_change_ms
    }

    pub fn settle_ms(&self) -> u64 {
        self.settle_ms
    }

    pub fn found_pause_ms(&self) -> u64 {
        self.found_pause_ms
    }

    pub fn max_aisles(&self) -> u32 {
        self.max_aisles
    }

    pub fn command_listener_enabled(&self) -> bool {
        self.command_listener_enabled
    }

    pub fn command_listener_port(&self) -> u16 {
        self.command_listener_port
    }

    pub fn notify_capacity(&self) -> usize {
        self.notify_capacity
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the aisle bound
    #[cfg(test)]
    pub fn with_max_aisles(mut self, max_aisles: u32) -> Self {
        self.max_aisles = max_aisles;
        self
    }

    /// Builder method for tests to collapse all maneuver dwells
    #[cfg(test)]
    pub fn with_fast_maneuvers(mut self) -> Self {
        self.pre_turn_pause_ms = 1;
        self.pivot_ms = 1;
        self.lane_change_ms = 1;
        self.settle_ms = 1;
        self.found_pause_ms = 1;
        self.sonar_poll_interval_ms = 1;
        self.frame_interval_ms = 1;
        self
    }

    /// Builder method for tests to shrink the reconnect backoff
    #[cfg(test)]
    pub fn with_fast_reconnect(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_backoff_ms = 1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vision_addr(), "127.0.0.1:8600");
        assert_eq!(config.confidence_threshold(), 0.70);
        assert_eq!(config.frame_interval_ms(), 30);
        assert_eq!(config.wall_threshold_cm(), 10);
        assert_eq!(config.max_aisles(), 5);
        assert_eq!(config.found_pause_ms(), 2000);
        assert_eq!(config.command_listener_port(), 65432);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml = r#"
[vision]
addr = "10.0.0.5:9000"

[motor]
device = "/dev/ttyUSB0"
baud = 115200

[sonar]
device = "/dev/ttyUSB1"
baud = 9600
"#;
        let parsed: TomlConfig = toml::from_str(toml).unwrap();
        assert_eq!(parsed.vision.confidence_threshold, 0.70);
        assert_eq!(parsed.search.max_aisles, 5);
        assert!(parsed.command.listener_enabled);
        assert_eq!(parsed.drive.found_pause_ms, 2000);
    }
}
