use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face encoding vector (512-dimensional for ArcFace, L2-normalized).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
    /// Model version that produced this encoding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Encoding {
    /// Euclidean distance between two encodings. Lower = more similar.
    pub fn distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Decide whether `other` depicts the same person, given a distance
    /// threshold. A larger tolerance admits more matches.
    pub fn matches(&self, other: &Encoding, tolerance: f32) -> bool {
        self.distance(other) <= tolerance
    }
}

/// Confidence in a match, interpreted as `1 - distance` and clamped to [0, 1].
pub fn match_confidence(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Overall result of an identification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Why an identification attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// The claimed ID is not in the registry.
    UnknownIdentity,
    /// No face was found in the probe photo.
    NoFace,
    /// More than one face was found in the probe photo.
    MultipleFaces,
    /// A comparison ran and the distance exceeded the tolerance.
    DifferentPerson,
    /// The enrolled reference photo is unreadable or contains no face.
    BadReference,
}

/// Structured report returned for every identification attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationReport {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Present only when a probe/reference comparison actually ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    /// The distance threshold that was in force.
    pub tolerance: f32,
    /// Where the probe photo was archived.
    pub evidence_path: String,
    /// Per-identity attempt number (also the evidence file stem).
    pub attempt: u64,
}
