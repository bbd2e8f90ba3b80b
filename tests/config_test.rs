//! Integration tests for configuration loading

use aislebot::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[vision]
addr = "192.168.0.50:9000"
confidence_threshold = 0.85
frame_interval_ms = 50
reconnect_attempts = 3
reconnect_backoff_ms = 500

[motor]
device = "/dev/ttyUSB0"
baud = 115200

[sonar]
device = "/dev/ttyUSB1"
baud = 19200
poll_interval_ms = 200
wall_threshold_cm = 25

[drive]
lane_change_ms = 2000
found_pause_ms = 1500

[search]
max_aisles = 8

[command]
listener_enabled = false
listener_port = 7000
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.vision_addr(), "192.168.0.50:9000");
    assert_eq!(config.confidence_threshold(), 0.85);
    assert_eq!(config.frame_interval_ms(), 50);
    assert_eq!(config.reconnect_attempts(), 3);
    assert_eq!(config.motor_device(), "/dev/ttyUSB0");
    assert_eq!(config.motor_baud(), 115200);
    assert_eq!(config.sonar_baud(), 19200);
    assert_eq!(config.wall_threshold_cm(), 25);
    assert_eq!(config.lane_change_ms(), 2000);
    assert_eq!(config.found_pause_ms(), 1500);
    // Unset drive timings keep their defaults
    assert_eq!(config.pivot_ms(), 500);
    assert_eq!(config.max_aisles(), 8);
    assert!(!config.command_listener_enabled());
    assert_eq!(config.command_listener_port(), 7000);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.vision_addr(), "127.0.0.1:8600");
    assert_eq!(config.confidence_threshold(), 0.70);
    assert_eq!(config.max_aisles(), 5);
}

#[test]
fn test_malformed_config_falls_back() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[vision\naddr = ").unwrap();
    temp_file.flush().unwrap();

    let config = Config::load_from_path(temp_file.path());
    assert_eq!(config.vision_addr(), "127.0.0.1:8600");
}
