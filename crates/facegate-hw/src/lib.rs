//! facegate-hw — Hardware abstraction for the access terminal.
//!
//! V4L2 camera capture and the serial door-actuator link.

pub mod camera;
pub mod frame;
pub mod serial;

pub use camera::{Camera, CameraError, CaptureSession, PixelFormat};
pub use frame::Frame;
pub use serial::{SerialError, SerialLink};
