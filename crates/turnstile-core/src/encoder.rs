//! The encoding seam between the decision procedure and the ONNX models.
//!
//! `FaceEncoder` is what [`crate::identifier::FaceIdentifier`] talks to, so
//! the decision procedure can be exercised in tests without model files.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Encoding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside the model dir.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model dir.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Face detection plus encoding extraction over decoded RGB photos.
pub trait FaceEncoder {
    /// Detect every face in the photo, sorted by confidence (best first).
    fn detect(&mut self, photo: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError>;

    /// Extract the encoding for one detected face.
    fn encode(&mut self, photo: &RgbImage, face: &BoundingBox) -> Result<Encoding, EncoderError>;
}

/// Production encoder: SCRFD detection + ArcFace recognition via ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from a directory holding `det_10g.onnx` and
    /// `w600k_r50.onnx`. Fails fast if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect(&mut self, photo: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        Ok(self.detector.detect(photo)?)
    }

    fn encode(&mut self, photo: &RgbImage, face: &BoundingBox) -> Result<Encoding, EncoderError> {
        Ok(self.recognizer.extract(photo, face)?)
    }
}
