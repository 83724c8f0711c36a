//! facegate-core — Access-decision engine for the face-gated door terminal.
//!
//! Face detection runs through an ONNX model; matching is LBPH. Both sit
//! behind the [`vision::Vision`] seam so the [`controller::AccessController`]
//! state machine is testable with deterministic stubs.

pub mod controller;
pub mod detector;
pub mod lbph;
pub mod store;
pub mod types;
pub mod vision;

pub use controller::{
    AccessController, ActuatorCommand, ActuatorLink, ControllerError, FrameOutcome, FrameReport,
    StatusSnapshot, AUTH_THRESHOLD,
};
pub use store::{ProfileStore, SqliteProfileStore, StoreError};
pub use types::{EnrolledProfile, FaceRegion, Mode, Verdict};
pub use vision::{OnnxLbphVision, Vision, VisionError};
