//! turnstile-core — Face-similarity identification engine.
//!
//! Detects faces with SCRFD and encodes them with ArcFace (both via ONNX
//! Runtime), then decides whether a probe photo matches an enrolled
//! reference using a Euclidean-distance threshold. Keeps per-identity
//! attempt counters and archives every probe as evidence.

mod alignment;
pub mod detector;
pub mod encoder;
pub mod identifier;
pub mod recognizer;
pub mod registry;
pub mod types;

pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use identifier::{FaceIdentifier, IdentifyError};
pub use registry::{IdentityRecord, Registry};
pub use types::{BoundingBox, Encoding, IdentificationReport, Outcome, RejectReason};
