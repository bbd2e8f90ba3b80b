//! Wheel driver command port
//!
//! Single-byte fire-and-forget commands over serial to the drive board:
//! 'F' forward, 'S' stop, 'L' pivot left, 'R' pivot right. The board
//! handles PWM and wheel timing; write failures are logged and never
//! escalate mid-run. `stop()` is safe to call redundantly and with no
//! port attached.

use crate::infra::config::Config;
use tokio::io::AsyncWriteExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    Forward,
    Stop,
    TurnLeft,
    TurnRight,
}

impl MotorCommand {
    #[inline]
    fn as_byte(&self) -> u8 {
        match self {
            MotorCommand::Forward => b'F',
            MotorCommand::Stop => b'S',
            MotorCommand::TurnLeft => b'L',
            MotorCommand::TurnRight => b'R',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotorCommand::Forward => "forward",
            MotorCommand::Stop => "stop",
            MotorCommand::TurnLeft => "turn_left",
            MotorCommand::TurnRight => "turn_right",
        }
    }
}

pub struct MotorController {
    port: tokio::sync::Mutex<Option<tokio_serial::SerialStream>>,
    /// Commands issued, in order, for test assertions
    #[cfg(test)]
    journal: parking_lot::Mutex<Vec<MotorCommand>>,
}

impl MotorController {
    /// Open the drive board port. A missing port is not fatal: commands
    /// degrade to log lines so the controller still runs on a dev machine.
    pub fn connect(config: &Config) -> Self {
        let port = match tokio_serial::new(config.motor_device(), config.motor_baud())
            .open_native_async()
        {
            Ok(p) => {
                info!(device = %config.motor_device(), baud = %config.motor_baud(), "motor_port_opened");
                Some(p)
            }
            Err(e) => {
                error!(device = %config.motor_device(), error = %e, "motor_port_open_failed");
                None
            }
        };

        Self {
            port: tokio::sync::Mutex::new(port),
            #[cfg(test)]
            journal: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Controller with no port attached; every command is journal/log only
    #[cfg(test)]
    pub fn disconnected() -> Self {
        Self {
            port: tokio::sync::Mutex::new(None),
            journal: parking_lot::Mutex::new(Vec::new()),
        }
    }

    async fn send(&self, command: MotorCommand) {
        #[cfg(test)]
        self.journal.lock().push(command);

        let mut guard = self.port.lock().await;
        match guard.as_mut() {
            Some(port) => {
                if let Err(e) = port.write_all(&[command.as_byte()]).await {
                    warn!(command = %command.as_str(), error = %e, "motor_write_failed");
                }
            }
            None => {
                debug!(command = %command.as_str(), "motor_command_no_port");
            }
        }
    }

    pub async fn forward(&self) {
        self.send(MotorCommand::Forward).await;
    }

    /// Halt the wheels. Redundant calls are harmless.
    pub async fn stop(&self) {
        self.send(MotorCommand::Stop).await;
    }

    pub async fn turn_left(&self) {
        self.send(MotorCommand::TurnLeft).await;
    }

    pub async fn turn_right(&self) {
        self.send(MotorCommand::TurnRight).await;
    }

    /// Final halt and port release, for process shutdown
    pub async fn cleanup(&self) {
        self.stop().await;
        let released = self.port.lock().await.take().is_some();
        if released {
            info!("motor_port_released");
        }
    }

    #[cfg(test)]
    pub fn commands(&self) -> Vec<MotorCommand> {
        self.journal.lock().clone()
    }

    #[cfg(test)]
    pub fn last_command(&self) -> Option<MotorCommand> {
        self.journal.lock().last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(MotorCommand::Forward.as_byte(), b'F');
        assert_eq!(MotorCommand::Stop.as_byte(), b'S');
        assert_eq!(MotorCommand::TurnLeft.as_byte(), b'L');
        assert_eq!(MotorCommand::TurnRight.as_byte(), b'R');
    }

    #[tokio::test]
    async fn test_stop_is_redundant_safe() {
        let motor = MotorController::disconnected();
        motor.stop().await;
        motor.stop().await;
        assert_eq!(motor.commands(), vec![MotorCommand::Stop, MotorCommand::Stop]);
    }

    #[tokio::test]
    async fn test_cleanup_stops_first() {
        let motor = MotorController::disconnected();
        motor.forward().await;
        motor.cleanup().await;
        assert_eq!(motor.last_command(), Some(MotorCommand::Stop));
    }
}
