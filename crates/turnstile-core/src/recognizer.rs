//! ArcFace encoding extraction via ONNX Runtime.
//!
//! Turns an aligned 112×112 face crop into a 512-dimensional L2-normalized
//! encoding (w600k_r50 export).

use crate::alignment;
use crate::types::{BoundingBox, Encoding};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: u32 = 112;
// ArcFace normalizes symmetrically: (p - 127.5) / 127.5, not /128.
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_ENCODING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model missing at {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face carries no landmarks, cannot align for encoding")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded ArcFace model");

        Ok(Self { session })
    }

    /// Extract an encoding for a detected face in an RGB photo.
    ///
    /// The face must carry landmarks (from the SCRFD detector); it is aligned
    /// to the canonical 112×112 crop before extraction. The result is
    /// L2-normalized.
    pub fn extract(
        &mut self,
        photo: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Encoding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;

        let aligned = alignment::align_face(photo, landmarks);
        let input = Self::preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, flat) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("encoding extraction: {e}")))?;

        if flat.len() != ARCFACE_ENCODING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_ENCODING_DIM}-dim encoding, got {}",
                flat.len()
            )));
        }

        Ok(Encoding {
            values: l2_normalize(flat),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }

    /// Pack a 112×112 aligned RGB crop into a normalized NCHW float tensor.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in aligned.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }

        tensor
    }
}

/// Scale a vector to unit length; an all-zero vector is returned unchanged.
fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| x / norm).collect()
    } else {
        values.to_vec()
    }
}
