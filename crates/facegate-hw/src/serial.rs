//! Serial link to the door-actuator microcontroller.
//!
//! Commands are newline-terminated ASCII lines over a raw tty. The link is
//! strictly best-effort: if the port cannot be opened or a write fails, the
//! link degrades to simulation mode where commands are only logged, and the
//! frame loop is never stalled (the port is opened non-blocking).

use facegate_core::{ActuatorCommand, ActuatorLink};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("failed to open port: {0}")]
    Open(std::io::Error),
    #[error("failed to configure port: {0}")]
    Configure(std::io::Error),
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),
}

pub struct SerialLink {
    /// `None` means simulation mode: sends are logged, not written.
    port: Option<File>,
    path: String,
}

impl SerialLink {
    /// Open and configure the tty at the given baud rate (8N1, raw mode,
    /// non-blocking).
    pub fn open(path: &str, baud: u32) -> Result<Self, SerialError> {
        let speed = baud_flag(baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(SerialError::Open)?;

        configure_raw(&file, speed)?;

        tracing::info!(port = path, baud, "actuator link connected");
        Ok(Self {
            port: Some(file),
            path: path.to_string(),
        })
    }

    /// Open the link, or fall back to simulation mode if the port is
    /// unavailable. The fallback is reported once, here.
    pub fn open_or_simulated(path: &str, baud: u32) -> Self {
        match Self::open(path, baud) {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(port = path, error = %e, "actuator link unavailable, simulation mode active");
                Self {
                    port: None,
                    path: path.to_string(),
                }
            }
        }
    }

    /// A link that never touches hardware. Used by tests and headless runs.
    pub fn simulated() -> Self {
        Self {
            port: None,
            path: String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl ActuatorLink for SerialLink {
    fn send(&mut self, command: ActuatorCommand) {
        let Some(file) = self.port.as_mut() else {
            tracing::info!(command = command.as_str(), "simulation: actuator command");
            return;
        };

        if let Err(e) = file.write_all(wire_line(command).as_bytes()) {
            // Degrade permanently rather than retrying a dead port per frame.
            tracing::warn!(port = %self.path, error = %e, "actuator write failed, degrading to simulation mode");
            self.port = None;
            return;
        }
        tracing::debug!(command = command.as_str(), "actuator command sent");
    }
}

/// The exact bytes the actuator firmware parses.
fn wire_line(command: ActuatorCommand) -> String {
    format!("{}\n", command.as_str())
}

fn baud_flag(baud: u32) -> Result<libc::speed_t, SerialError> {
    match baud {
        9_600 => Ok(libc::B9600),
        19_200 => Ok(libc::B19200),
        38_400 => Ok(libc::B38400),
        57_600 => Ok(libc::B57600),
        115_200 => Ok(libc::B115200),
        230_400 => Ok(libc::B230400),
        other => Err(SerialError::UnsupportedBaud(other)),
    }
}

fn configure_raw(file: &File, speed: libc::speed_t) -> Result<(), SerialError> {
    let fd = file.as_raw_fd();

    // SAFETY: fd is valid for the lifetime of `file`; termios is a plain
    // C struct fully initialized by tcgetattr before use.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(SerialError::Configure(std::io::Error::last_os_error()));
        }

        libc::cfmakeraw(&mut tio);
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);

        // Reads never block; writes are bounded by O_NONBLOCK.
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 0;

        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(SerialError::Configure(std::io::Error::last_os_error()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_lines_are_newline_terminated() {
        assert_eq!(wire_line(ActuatorCommand::SystemReady), "system_ready\n");
        assert_eq!(wire_line(ActuatorCommand::AccessGranted), "access_granted\n");
        assert_eq!(wire_line(ActuatorCommand::AccessDenied), "access_denied\n");
        assert_eq!(wire_line(ActuatorCommand::NoFace), "no_face\n");
    }

    #[test]
    fn test_baud_flags() {
        assert!(baud_flag(115_200).is_ok());
        assert!(baud_flag(9_600).is_ok());
        assert!(matches!(
            baud_flag(12_345),
            Err(SerialError::UnsupportedBaud(12_345))
        ));
    }

    #[test]
    fn test_simulated_link_sends_without_error() {
        let mut link = SerialLink::simulated();
        assert!(!link.is_connected());
        link.send(ActuatorCommand::SystemReady);
        link.send(ActuatorCommand::AccessGranted);
        link.send(ActuatorCommand::NoFace);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_open_missing_port_is_an_error() {
        assert!(matches!(
            SerialLink::open("/dev/facegate-test-nonexistent", 115_200),
            Err(SerialError::Open(_))
        ));
    }

    #[test]
    fn test_open_or_simulated_falls_back() {
        let link = SerialLink::open_or_simulated("/dev/facegate-test-nonexistent", 115_200);
        assert!(!link.is_connected());
    }
}
