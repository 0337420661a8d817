//! The single named-error taxonomy for the serving control plane.
//!
//! Every failure mode in `SPEC_FULL.md` §7 is one variant here. The HTTP
//! adapter (`http.rs`) is the *only* place that turns a variant into a status
//! code — nowhere else in the crate inspects a status or constructs JSON
//! error bodies directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::types::ResourceSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    /// Caller-supplied input was structurally invalid: a missing audio file,
    /// a sample array with the wrong rank, an unrecognised enum value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Admission control rejected the request; the snapshot observed at the
    /// decision is attached for diagnostics.
    #[error("resource rejected: {message}")]
    ResourceRejected {
        message: String,
        snapshot: ResourceSnapshot,
    },

    /// The inference library raised during `transcribe`.
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    /// The inference library raised during model construction. No model is
    /// cached in the registry as a result.
    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    /// A temp-file write, upload read, or model download failed at the I/O
    /// boundary.
    #[error("input I/O error: {0}")]
    InputIo(String),
}

impl SttError {
    fn status(&self) -> StatusCode {
        match self {
            SttError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            SttError::ResourceRejected { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SttError::InferenceFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            SttError::ModelLoadFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            SttError::InputIo(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for SttError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();
        tracing::warn!(%status, %detail, "request failed");
        (status, axum::Json(ErrorBody { detail })).into_response()
    }
}
