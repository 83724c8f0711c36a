use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Per-frame classification outcome. Produced fresh each frame, never stored.
///
/// The confidence value is the matcher's native distance metric:
/// lower = stronger match, no fixed upper bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Authorized(f32),
    Unknown(f32),
    NotTrained,
    Error,
}

impl Verdict {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Verdict::Authorized(_))
    }
}

/// Operating mode of the access terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Idle,
    Enroll,
    Recognize,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => write!(f, "idle"),
            Mode::Enroll => write!(f, "enroll"),
            Mode::Recognize => write!(f, "recognize"),
        }
    }
}

/// The single enrolled identity.
///
/// At most one exists at a time: a later enrollment replaces it wholesale,
/// an explicit clear destroys it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledProfile {
    pub template: crate::lbph::FaceTemplate,
    pub name: String,
    /// RFC 3339 enrollment timestamp.
    pub enrolled_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Idle.to_string(), "idle");
        assert_eq!(Mode::Enroll.to_string(), "enroll");
        assert_eq!(Mode::Recognize.to_string(), "recognize");
    }

    #[test]
    fn test_verdict_is_authorized() {
        assert!(Verdict::Authorized(12.0).is_authorized());
        assert!(!Verdict::Unknown(90.0).is_authorized());
        assert!(!Verdict::NotTrained.is_authorized());
        assert!(!Verdict::Error.is_authorized());
    }
}
