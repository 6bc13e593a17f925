//! HTTP surface: one identify resource plus status and attempt introspection.

use crate::engine::EngineHandle;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Shared handler state. Registry size and tolerance are fixed at startup,
/// so they live here rather than behind the engine channel.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub tolerance: f32,
    pub identities: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/identify", post(identify))
        .route("/api/status", get(status))
        .route("/api/attempts/{id}", get(attempts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct IdentifyRequest {
    /// Claimed identity ID.
    pub id: String,
    /// Base64-encoded image bytes (any format the `image` crate decodes).
    pub image: String,
}

async fn identify(
    State(state): State<AppState>,
    Json(req): Json<IdentifyRequest>,
) -> impl IntoResponse {
    // Attempt timestamps record when the request arrived, not when the
    // engine got around to it.
    let received = Utc::now();

    // IDs become archive directory names; refuse anything path-like.
    if req.id.is_empty() || req.id.contains(['/', '\\']) || req.id.contains("..") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid identity id" })),
        );
    }

    let bytes = match BASE64.decode(&req.image) {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "image is not valid base64" })),
            );
        }
    };

    let probe = match image::load_from_memory(&bytes) {
        Ok(img) => img.to_rgb8(),
        Err(err) => {
            tracing::debug!(id = %req.id, error = %err, "probe rejected: undecodable image");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "image bytes could not be decoded" })),
            );
        }
    };

    match state.engine.identify(req.id, probe, received).await {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(value) => (StatusCode::OK, Json(value)),
            Err(err) => internal_error(err.into()),
        },
        Err(err) => internal_error(anyhow::Error::new(err)),
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": state.identities,
            "tolerance": state.tolerance,
        })),
    )
}

async fn attempts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.attempts(id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({
                "id": record.id,
                "count": record.count,
                "timestamps": record.timestamps,
            })),
        ),
        Err(err) => internal_error(anyhow::Error::new(err)),
    }
}

fn internal_error(err: anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}
