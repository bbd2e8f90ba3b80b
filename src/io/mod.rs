//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `vision` - Detection feed from the vision sidecar (JSON lines over TCP)
//! - `motor` - Serial command port to the wheel driver board
//! - `sonar` - Ultrasonic obstacle sensing over serial
//! - `command_listener` - TCP listener for remote cart/search commands
//! - `notifier` - Typed channel for UI notifications

pub mod command_listener;
pub mod motor;
pub mod notifier;
pub mod sonar;
pub mod vision;

// Re-export commonly used types
pub use command_listener::{start_command_listener, CommandListenerConfig, UiCommand};
pub use motor::MotorController;
pub use notifier::{create_notifier, Notification, NotifierSender};
pub use sonar::{Sonar, SonarError, SonarSource};
pub use vision::{DetectionFeed, FeedError, VisionSource};
