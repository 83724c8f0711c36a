//! The access-decision state machine.
//!
//! Owns the mode state (idle / enroll / recognize), the enrollment workflow,
//! the per-frame decision policy, edge-triggered actuator signaling, and the
//! running counters. Frames must be processed strictly sequentially: the
//! edge-triggering invariant depends on it, which is why the controller is
//! a plain owned value with `&mut self` methods and no interior locking.

use crate::store::{ProfileStore, StoreError};
use crate::types::{EnrolledProfile, Mode, Verdict};
use crate::vision::{Vision, VisionError};
use serde::Serialize;
use thiserror::Error;

/// Match distances below this authorize entry (native scale, lower = better).
pub const AUTH_THRESHOLD: f32 = 70.0;

/// Display name given to the enrolled identity.
pub const DEFAULT_PROFILE_NAME: &str = "Authorized Person";

/// Commands understood by the door-actuator firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    SystemReady,
    AccessGranted,
    AccessDenied,
    NoFace,
}

impl ActuatorCommand {
    /// Wire string, sent newline-terminated over the link.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorCommand::SystemReady => "system_ready",
            ActuatorCommand::AccessGranted => "access_granted",
            ActuatorCommand::AccessDenied => "access_denied",
            ActuatorCommand::NoFace => "no_face",
        }
    }
}

/// Fire-and-forget command channel to the door actuator.
/// No acknowledgement is awaited; an unavailable link degrades to logging.
pub trait ActuatorLink {
    fn send(&mut self, command: ActuatorCommand);
}

/// What a processed frame meant, for display purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No face, or face present but nothing to do in the current mode.
    Waiting,
    /// Face present, profile enrolled, terminal idle.
    Ready,
    /// Enrollment completed this frame.
    EnrollComplete,
    AccessGranted,
    AccessDenied,
}

/// Per-frame result returned to the caller.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    /// Number of faces the detector saw (only the first is acted upon).
    pub faces: usize,
    /// Verdict produced this frame, if the frame was matched.
    pub verdict: Option<Verdict>,
}

/// Read-only snapshot for the operator status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub trained: bool,
    pub actuator_signaled: bool,
    pub granted_count: u64,
    pub denied_count: u64,
    pub mode: Mode,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("{0}")]
    Detection(VisionError),
    #[error("{0}")]
    Training(VisionError),
    #[error("no profile enrolled; enroll first")]
    NotEnrolled,
    #[error("profile store: {0}")]
    Store(#[from] StoreError),
}

/// Session-lifetime mutable state, owned by the controller.
struct SessionState {
    mode: Mode,
    last_verdict: Option<Verdict>,
    actuator_signaled: bool,
    granted_count: u64,
    denied_count: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            mode: Mode::Idle,
            last_verdict: None,
            actuator_signaled: false,
            granted_count: 0,
            denied_count: 0,
        }
    }
}

pub struct AccessController<V, S, L> {
    vision: V,
    store: S,
    link: L,
    profile: Option<EnrolledProfile>,
    state: SessionState,
}

impl<V: Vision, S: ProfileStore, L: ActuatorLink> AccessController<V, S, L> {
    pub fn new(vision: V, store: S, link: L) -> Self {
        Self {
            vision,
            store,
            link,
            profile: None,
            state: SessionState::new(),
        }
    }

    /// Load the persisted profile, if any. A corrupt or unreadable record
    /// is logged and treated as absence; never fatal.
    pub fn load_profile(&mut self) {
        match self.store.load() {
            Ok(Some(profile)) => {
                tracing::info!(name = %profile.name, enrolled_at = %profile.enrolled_at, "loaded enrolled profile");
                self.profile = Some(profile);
            }
            Ok(None) => {
                tracing::info!("no enrolled profile; enroll to begin");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load profile, treating as not enrolled");
                self.profile = None;
            }
        }
    }

    pub fn trained(&self) -> bool {
        self.profile.is_some()
    }

    /// Enter enrollment mode. Always permitted.
    pub fn request_enroll(&mut self) {
        self.state.mode = Mode::Enroll;
        tracing::info!("enrollment mode: show the face to the camera");
    }

    /// Enter recognition mode. Rejected while no profile is enrolled.
    pub fn request_recognize(&mut self) -> Result<(), ControllerError> {
        if !self.trained() {
            return Err(ControllerError::NotEnrolled);
        }
        self.state.mode = Mode::Recognize;
        // A fresh recognition session: the first non-authorized frame
        // announces denial exactly once even without a preceding grant.
        self.state.last_verdict = None;
        tracing::info!("recognition mode active");
        Ok(())
    }

    /// Delete the enrolled profile and return to idle.
    ///
    /// Forcing the mode back to `Idle` (rather than leaving a profileless
    /// recognition session running) is deliberate: a terminal that silently
    /// stops matching is worse than one that visibly needs re-arming.
    pub fn clear_profile(&mut self) -> Result<(), ControllerError> {
        self.store.delete()?;
        self.profile = None;
        self.state.mode = Mode::Idle;
        tracing::info!("enrolled profile cleared");
        Ok(())
    }

    /// Process one camera frame: detect, decide, signal.
    ///
    /// Deterministic given (frame, session state, profile). Vision failures
    /// during matching are absorbed into a `Verdict::Error` for the frame;
    /// detection and training failures are returned to the caller, with the
    /// session left intact either way.
    pub fn process_frame(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<FrameReport, ControllerError> {
        let faces = self
            .vision
            .detect_faces(gray, width, height)
            .map_err(ControllerError::Detection)?;

        let Some(region) = faces.first().cloned() else {
            // The sole mechanism that resets an authorized state when the
            // subject leaves the frame; there is no timeout-based expiry.
            if self.state.actuator_signaled {
                self.state.actuator_signaled = false;
                self.link.send(ActuatorCommand::NoFace);
            }
            return Ok(FrameReport {
                outcome: FrameOutcome::Waiting,
                faces: 0,
                verdict: None,
            });
        };

        let face_count = faces.len();

        match self.state.mode {
            Mode::Enroll => {
                let template = self
                    .vision
                    .train(gray, width, height, &region)
                    .map_err(ControllerError::Training)?;

                let profile = EnrolledProfile {
                    template,
                    name: DEFAULT_PROFILE_NAME.to_string(),
                    enrolled_at: chrono::Utc::now().to_rfc3339(),
                };

                // Enrollment commits in memory even if persistence fails;
                // the operator is warned and can re-enroll after fixing storage.
                if let Err(e) = self.store.save(&profile) {
                    tracing::warn!(error = %e, "failed to persist enrolled profile");
                }

                tracing::info!(name = %profile.name, "face enrolled");
                self.profile = Some(profile);
                self.state.mode = Mode::Idle;

                Ok(FrameReport {
                    outcome: FrameOutcome::EnrollComplete,
                    faces: face_count,
                    verdict: None,
                })
            }

            Mode::Recognize if self.trained() => {
                let verdict = self.match_region(gray, width, height, &region);
                let outcome = self.apply_signaling(verdict);
                self.state.last_verdict = Some(verdict);

                Ok(FrameReport {
                    outcome,
                    faces: face_count,
                    verdict: Some(verdict),
                })
            }

            // Idle, or a recognition session left without a profile.
            _ => Ok(FrameReport {
                outcome: if self.trained() {
                    FrameOutcome::Ready
                } else {
                    FrameOutcome::Waiting
                },
                faces: face_count,
                verdict: None,
            }),
        }
    }

    /// Pure read-only snapshot of the session.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            trained: self.trained(),
            actuator_signaled: self.state.actuator_signaled,
            granted_count: self.state.granted_count,
            denied_count: self.state.denied_count,
            mode: self.state.mode,
        }
    }

    fn match_region(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &crate::types::FaceRegion,
    ) -> Verdict {
        let template = match &self.profile {
            Some(p) => &p.template,
            None => return Verdict::NotTrained,
        };
        match self.vision.match_template(template, gray, width, height, region) {
            Ok((_label, confidence)) if confidence < AUTH_THRESHOLD => {
                Verdict::Authorized(confidence)
            }
            Ok((_label, confidence)) => Verdict::Unknown(confidence),
            Err(e) => {
                tracing::warn!(error = %e, "match failed for this frame");
                Verdict::Error
            }
        }
    }

    /// Edge-triggered signaling: commands go out on state transitions only,
    /// never on every frame a state holds.
    fn apply_signaling(&mut self, verdict: Verdict) -> FrameOutcome {
        if verdict.is_authorized() {
            if !self.state.actuator_signaled {
                self.state.granted_count += 1;
                self.state.actuator_signaled = true;
                self.link.send(ActuatorCommand::AccessGranted);
            }
            return FrameOutcome::AccessGranted;
        }

        // A match error is a non-authorized outcome, but signals nothing:
        // the frame carries no usable evidence either way.
        if verdict == Verdict::Error {
            return FrameOutcome::AccessDenied;
        }

        // Denial announces once: on the authorized->denied edge, or on the
        // very first verdict of a recognition session.
        if self.state.actuator_signaled || self.state.last_verdict.is_none() {
            self.state.denied_count += 1;
            self.state.actuator_signaled = false;
            self.link.send(ActuatorCommand::AccessDenied);
        }
        FrameOutcome::AccessDenied
    }
}
