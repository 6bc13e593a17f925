//! Engine thread: owns the ONNX sessions and the identifier state.
//!
//! The ort sessions are mutable and the identifier mutates counters and the
//! evidence archive, so everything lives on one dedicated OS thread and HTTP
//! handlers talk to it over an mpsc channel with oneshot replies. This is
//! also what serializes concurrent identify requests.

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use turnstile_core::{FaceEncoder, FaceIdentifier, IdentificationReport, IdentifyError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("identification failed: {0}")]
    Identify(#[from] IdentifyError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Attempt bookkeeping for one identity, as reported over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub id: String,
    pub count: u64,
    pub timestamps: Vec<DateTime<Utc>>,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Identify {
        id: String,
        probe: RgbImage,
        received: DateTime<Utc>,
        reply: oneshot::Sender<Result<IdentificationReport, EngineError>>,
    },
    Attempts {
        id: String,
        reply: oneshot::Sender<AttemptRecord>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one identification attempt on the engine thread.
    pub async fn identify(
        &self,
        id: String,
        probe: RgbImage,
        received: DateTime<Utc>,
    ) -> Result<IdentificationReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Identify { id, probe, received, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Fetch the attempt count and timestamp history for an identity.
    pub async fn attempts(&self, id: String) -> Result<AttemptRecord, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Attempts { id, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread and return a handle to it.
pub fn spawn_engine(
    mut encoder: Box<dyn FaceEncoder + Send>,
    mut identifier: FaceIdentifier,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("turnstile-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Identify { id, probe, received, reply } => {
                        let result = identifier
                            .identify(encoder.as_mut(), &probe, &id, received)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Attempts { id, reply } => {
                        let record = AttemptRecord {
                            count: identifier.attempt_count(&id),
                            timestamps: identifier.attempt_log(&id).to_vec(),
                            id,
                        };
                        let _ = reply.send(record);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
