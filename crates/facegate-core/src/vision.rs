//! Vision capability seam.
//!
//! The access controller never talks to the detector or matcher directly;
//! it goes through [`Vision`], so the decision logic is testable with
//! deterministic stubs and the backends stay swappable.

use crate::detector::FaceDetector;
use crate::lbph::{FaceTemplate, LbphCoder};
use crate::types::FaceRegion;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("face detection unavailable: {0}")]
    DetectionUnavailable(String),
    #[error("training failed: {0}")]
    TrainingFailed(String),
    #[error("match failed: {0}")]
    MatchFailed(String),
}

/// Face detection, template training, and template matching.
///
/// Match confidence is a distance on the matcher's native scale:
/// lower = stronger match, no fixed upper bound.
pub trait Vision {
    /// Detect faces in a grayscale frame, strongest detection first.
    /// May return an empty list; no upper bound is guaranteed.
    fn detect_faces(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, VisionError>;

    /// Train a template from a face region within a frame.
    fn train(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<FaceTemplate, VisionError>;

    /// Match a face region against an enrolled template.
    /// Returns `(label, confidence)`; label is always 0 in this
    /// single-identity system.
    fn match_template(
        &mut self,
        template: &FaceTemplate,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<(u32, f32), VisionError>;
}

/// Production backend: ONNX face detection plus LBPH matching.
pub struct OnnxLbphVision {
    detector: FaceDetector,
    coder: LbphCoder,
}

impl OnnxLbphVision {
    /// Load the detection model; the LBPH coder needs no model file.
    pub fn load(detector_model_path: &str) -> Result<Self, VisionError> {
        let detector = FaceDetector::load(detector_model_path)
            .map_err(|e| VisionError::DetectionUnavailable(e.to_string()))?;
        Ok(Self {
            detector,
            coder: LbphCoder,
        })
    }
}

impl Vision for OnnxLbphVision {
    fn detect_faces(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, VisionError> {
        self.detector
            .detect(gray, width, height)
            .map_err(|e| VisionError::DetectionUnavailable(e.to_string()))
    }

    fn train(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<FaceTemplate, VisionError> {
        self.coder
            .extract(gray, width, height, region)
            .map_err(|e| VisionError::TrainingFailed(e.to_string()))
    }

    fn match_template(
        &mut self,
        template: &FaceTemplate,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<(u32, f32), VisionError> {
        let probe = self
            .coder
            .extract(gray, width, height, region)
            .map_err(|e| VisionError::MatchFailed(e.to_string()))?;
        let distance = self
            .coder
            .distance(template, &probe)
            .map_err(|e| VisionError::MatchFailed(e.to_string()))?;
        Ok((0, distance))
    }
}
