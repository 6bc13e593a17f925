//! The identification decision procedure.
//!
//! One operation: compare a probe photo against the enrolled reference for a
//! claimed identity, archive the probe as evidence, record the attempt, and
//! build a structured report. Every attempt — including unknown IDs — is
//! counted, timestamped, and archived.

use crate::encoder::FaceEncoder;
use crate::registry::Registry;
use crate::types::{
    match_confidence, IdentificationReport, Outcome, RejectReason,
};
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error("failed to create archive directory {path}: {source}")]
    ArchiveDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write evidence file {path}: {source}")]
    EvidenceWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Encoder(#[from] crate::encoder::EncoderError),
}

/// Outcome of the probe/reference comparison, before report assembly.
enum Decision {
    Compared { matched: bool, confidence: f32 },
    Rejected(RejectReason),
}

/// The face-similarity identification engine with attempt bookkeeping.
///
/// Holds mutable state (attempt counters, timestamp history) and owns the
/// evidence archive layout, so callers are expected to serialize access —
/// the daemon runs one of these on a dedicated engine thread.
pub struct FaceIdentifier {
    registry: Registry,
    tolerance: f32,
    successful_dir: PathBuf,
    unsuccessful_dir: PathBuf,
    /// ID → number of prior attempts; drives unique evidence filenames.
    attempts: HashMap<String, u64>,
    /// ID → request timestamps, every attempt including unknown IDs.
    history: HashMap<String, Vec<DateTime<Utc>>>,
}

impl FaceIdentifier {
    /// Create the identifier and the top-level archive directories.
    pub fn new(
        registry: Registry,
        tolerance: f32,
        history_dir: &Path,
    ) -> Result<Self, IdentifyError> {
        let successful_dir = history_dir.join("successful");
        let unsuccessful_dir = history_dir.join("unsuccessful");
        for dir in [&successful_dir, &unsuccessful_dir] {
            std::fs::create_dir_all(dir).map_err(|source| IdentifyError::ArchiveDir {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            registry,
            tolerance,
            successful_dir,
            unsuccessful_dir,
            attempts: HashMap::new(),
            history: HashMap::new(),
        })
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of identify calls seen for this ID.
    pub fn attempt_count(&self, id: &str) -> u64 {
        self.history.get(id).map_or(0, |h| h.len() as u64)
    }

    /// Request timestamps recorded for this ID, oldest first.
    pub fn attempt_log(&self, id: &str) -> &[DateTime<Utc>] {
        self.history.get(id).map_or(&[], Vec::as_slice)
    }

    /// Run one identification attempt.
    ///
    /// Whatever the outcome, the attempt is appended to the history, the
    /// per-ID counter advances, and the probe is archived as evidence.
    pub fn identify(
        &mut self,
        encoder: &mut dyn FaceEncoder,
        probe: &RgbImage,
        id: &str,
        request_time: DateTime<Utc>,
    ) -> Result<IdentificationReport, IdentifyError> {
        self.history.entry(id.to_string()).or_default().push(request_time);

        let record = self.registry.get(id).cloned();
        let decision = match &record {
            None => Decision::Rejected(RejectReason::UnknownIdentity),
            Some(record) => {
                let faces = encoder.detect(probe)?;
                match faces.len() {
                    0 => Decision::Rejected(RejectReason::NoFace),
                    1 => self.compare(encoder, probe, &faces[0], &record.photo)?,
                    n => {
                        tracing::debug!(id, faces = n, "probe rejected: multiple faces");
                        Decision::Rejected(RejectReason::MultipleFaces)
                    }
                }
            }
        };

        let succeeded = matches!(decision, Decision::Compared { matched: true, .. });
        let (attempt, evidence_path) = self.archive_probe(probe, id, succeeded)?;

        let (reason, confidence) = match decision {
            Decision::Compared { matched: true, confidence } => (None, Some(confidence)),
            Decision::Compared { matched: false, confidence } => {
                (Some(RejectReason::DifferentPerson), Some(confidence))
            }
            Decision::Rejected(reason) => (Some(reason), None),
        };

        tracing::info!(
            id,
            outcome = if succeeded { "success" } else { "failure" },
            ?reason,
            attempt,
            history_len = self.attempt_count(id),
            "identification attempt recorded"
        );

        Ok(IdentificationReport {
            outcome: if succeeded { Outcome::Success } else { Outcome::Failure },
            reason,
            confidence,
            position: record.as_ref().map(|r| r.position.clone()),
            position_id: record.as_ref().map(|r| r.position_id.clone()),
            tolerance: self.tolerance,
            evidence_path: evidence_path.display().to_string(),
            attempt,
        })
    }

    /// Encode the single probe face and the enrolled reference, then compare.
    ///
    /// A reference photo that cannot be read or contains no face is a
    /// recorded failure (`bad-reference`), not an error: the probe is still
    /// archived and the attempt still counts.
    fn compare(
        &self,
        encoder: &mut dyn FaceEncoder,
        probe: &RgbImage,
        probe_face: &crate::types::BoundingBox,
        reference_path: &Path,
    ) -> Result<Decision, IdentifyError> {
        let reference = match image::open(reference_path) {
            Ok(img) => img.to_rgb8(),
            Err(err) => {
                tracing::warn!(
                    path = %reference_path.display(),
                    error = %err,
                    "reference photo unreadable"
                );
                return Ok(Decision::Rejected(RejectReason::BadReference));
            }
        };

        let reference_faces = encoder.detect(&reference)?;
        // Most confident face wins if the reference has several.
        let Some(reference_face) = reference_faces.first() else {
            tracing::warn!(path = %reference_path.display(), "reference photo has no face");
            return Ok(Decision::Rejected(RejectReason::BadReference));
        };

        let reference_encoding = encoder.encode(&reference, reference_face)?;
        let probe_encoding = encoder.encode(probe, probe_face)?;

        let distance = reference_encoding.distance(&probe_encoding);
        Ok(Decision::Compared {
            matched: distance <= self.tolerance,
            confidence: match_confidence(distance),
        })
    }

    /// Archive the probe as `<outcome dir>/id<ID>/<n>.jpeg` and return the
    /// attempt number and path. The first attempt for an ID creates its
    /// per-ID directory on both sides of the archive.
    fn archive_probe(
        &mut self,
        probe: &RgbImage,
        id: &str,
        succeeded: bool,
    ) -> Result<(u64, PathBuf), IdentifyError> {
        let attempt = match self.attempts.get_mut(id) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.attempts.insert(id.to_string(), 0);
                for side in [&self.successful_dir, &self.unsuccessful_dir] {
                    let dir = side.join(format!("id{id}"));
                    std::fs::create_dir_all(&dir).map_err(|source| {
                        IdentifyError::ArchiveDir { path: dir.clone(), source }
                    })?;
                }
                0
            }
        };

        let side = if succeeded { &self.successful_dir } else { &self.unsuccessful_dir };
        let path = side.join(format!("id{id}")).join(format!("{attempt}.jpeg"));
        probe
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .map_err(|source| IdentifyError::EvidenceWrite { path: path.clone(), source })?;

        Ok((attempt, path))
    }
}
