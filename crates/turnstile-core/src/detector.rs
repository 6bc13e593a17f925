//! SCRFD face detection via ONNX Runtime.
//!
//! Runs the det_10g SCRFD export: anchor-free decoding over three stride
//! levels followed by NMS. Input is a decoded RGB photo; output is every
//! detected face, best first, so callers can branch on the face count.

use crate::types::BoundingBox;
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection model missing at {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied by the letterbox resize, for mapping
/// detections back into photo coordinates.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Face detector over decoded RGB photos.
pub struct FaceDetector {
    session: Session,
    input_size: u32,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(path = %model_path.display(), outputs = num_outputs, "loaded SCRFD model");

        // The det_10g export carries 9 outputs in the standard layout:
        // [0-2] scores, [3-5] bboxes, [6-8] landmarks, each for strides 8/16/32.
        if num_outputs < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides x score/bbox/kps), got {num_outputs}"
            )));
        }

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
        })
    }

    /// Detect faces in an RGB photo, returning bounding boxes sorted by confidence.
    pub fn detect(&mut self, photo: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = self.preprocess(photo);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();

        for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let tensor_at = |slot: usize, kind: &str| {
                outputs[slot].try_extract_tensor::<f32>().map_err(|e| {
                    DetectorError::InferenceFailed(format!("{kind} at stride {stride}: {e}"))
                })
            };
            let (_, scores) = tensor_at(level, "scores")?;
            let (_, bboxes) = tensor_at(level + 3, "bboxes")?;
            let (_, kps) = tensor_at(level + 6, "landmarks")?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                self.input_size as usize,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        // nms sorts internally, so the survivors come back best-first.
        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }

    /// Letterbox-resize the photo and pack it into a normalized NCHW tensor.
    fn preprocess(&self, photo: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
        let (width, height) = photo.dimensions();
        let size = self.input_size;

        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).max(1);
        let new_h = ((height as f32 * scale).round() as u32).max(1);
        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;

        let resized = imageops::resize(photo, new_w, new_h, imageops::FilterType::Triangle);

        let pad_x_start = pad_x.floor() as u32;
        let pad_y_start = pad_y.floor() as u32;

        // Pad with SCRFD_MEAN so the border normalizes to 0.0.
        let mut tensor =
            Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for y in 0..size {
            for x in 0..size {
                let pixel = if y >= pad_y_start
                    && y < pad_y_start + new_h
                    && x >= pad_x_start
                    && x < pad_x_start + new_w
                {
                    resized.get_pixel(x - pad_x_start, y - pad_y_start).0
                } else {
                    [SCRFD_MEAN as u8; 3]
                };

                for c in 0..3 {
                    tensor[[0, c, y as usize, x as usize]] =
                        (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
                }
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

/// Decode the raw score/bbox/landmark tensors for one stride level into
/// photo-space bounding boxes.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid) as f32 * stride as f32;
        let anchor_cy = (anchor_idx / grid) as f32 * stride as f32;

        // bbox offsets are [left, top, right, bottom] distances in stride units
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        // Map from letterboxed space back to photo space
        let unmap = |px: f32, py: f32| {
            (
                (px - letterbox.pad_x) / letterbox.scale,
                (py - letterbox.pad_y) / letterbox.scale,
            )
        };
        let (orig_x1, orig_y1) = unmap(x1, y1);
        let (orig_x2, orig_y2) = unmap(x2, y2);

        let kps_off = idx * 10;
        let landmarks = if kps_off + 9 < kps.len() {
            let mut lms = [(0.0f32, 0.0f32); 5];
            for (i, lm) in lms.iter_mut().enumerate() {
                let lx = anchor_cx + kps[kps_off + i * 2] * stride as f32;
                let ly = anchor_cy + kps[kps_off + i * 2 + 1] * stride as f32;
                *lm = unmap(lx, ly);
            }
            Some(lms)
        } else {
            None
        };

        detections.push(BoundingBox {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-maximum suppression, greedy over descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection over union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_at(x: f32, y: f32, side: f32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: side,
            height: side,
            confidence,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_self_is_one() {
        let face = face_at(10.0, 20.0, 64.0, 0.8);
        assert!((iou(&face, &face) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let left = face_at(0.0, 0.0, 16.0, 0.8);
        let right = face_at(100.0, 0.0, 16.0, 0.8);
        assert!(iou(&left, &right).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_shifted() {
        // Two 20x20 boxes shifted by half a width: overlap 200, union 600
        let a = face_at(0.0, 0.0, 20.0, 0.8);
        let b = face_at(10.0, 0.0, 20.0, 0.8);
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_drops_lower_scored_duplicate() {
        let candidates = vec![
            face_at(12.0, 12.0, 80.0, 0.72),
            face_at(10.0, 10.0, 80.0, 0.95),
            face_at(300.0, 300.0, 40.0, 0.6),
        ];
        let kept = nms(candidates, 0.4);
        assert_eq!(kept.len(), 2);
        // survivors come back best-first
        assert!((kept[0].confidence - 0.95).abs() < 1e-6);
        assert!((kept[1].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_separated_faces() {
        let candidates = vec![
            face_at(0.0, 0.0, 24.0, 0.9),
            face_at(120.0, 40.0, 24.0, 0.85),
        ];
        assert_eq!(nms(candidates, 0.4).len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(Vec::new(), 0.4).is_empty());
    }

    #[test]
    fn test_decode_stride_below_threshold_yields_nothing() {
        let grid = 640 / 32;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let scores = vec![0.1f32; anchors];
        let bboxes = vec![1.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];
        let lb = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let dets = decode_stride(&scores, &bboxes, &kps, 32, 640, &lb, 0.5);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_decode_stride_maps_back_through_letterbox() {
        let grid = 640 / 32;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];

        // One hot anchor: cell (4, 2) => anchor center (128, 64) at stride 32.
        let cell = 2 * grid + 4;
        let idx = cell * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        // 1 stride unit in every direction => 64x64 box centered on the anchor
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        // Photo was scaled by 0.5 and padded by (10, 20)
        let lb = LetterboxInfo { scale: 0.5, pad_x: 10.0, pad_y: 20.0 };
        let dets = decode_stride(&scores, &bboxes, &kps, 32, 640, &lb, 0.5);
        assert_eq!(dets.len(), 1);

        let d = &dets[0];
        // letterboxed box: (96, 32)..(160, 96); unmapped: ((96-10)/0.5, (32-20)/0.5)
        assert!((d.x - 172.0).abs() < 1e-3, "x = {}", d.x);
        assert!((d.y - 24.0).abs() < 1e-3, "y = {}", d.y);
        assert!((d.width - 128.0).abs() < 1e-3, "w = {}", d.width);
        assert!((d.height - 128.0).abs() < 1e-3, "h = {}", d.height);
        assert!(d.landmarks.is_some());
    }

    #[test]
    fn test_preprocess_letterbox_geometry() {
        // A 1280x720 photo into a 640x640 square: scale 0.5, vertical pads.
        let input = 640.0f32;
        let (w, h) = (1280.0f32, 720.0f32);
        let scale = (input / w).min(input / h);
        assert!((scale - 0.5).abs() < 1e-6);

        let pad_y = (input - (h * scale).round()) / 2.0;
        assert!((pad_y - 140.0).abs() < 1e-6);

        // Round-tripping a point through letterbox space is lossless.
        let lb = LetterboxInfo { scale, pad_x: 0.0, pad_y };
        let (ox, oy) = (400.0f32, 300.0f32);
        let (bx, by) = (ox * lb.scale + lb.pad_x, oy * lb.scale + lb.pad_y);
        assert!(((bx - lb.pad_x) / lb.scale - ox).abs() < 1e-3);
        assert!(((by - lb.pad_y) / lb.scale - oy).abs() < 1e-3);
    }
}
