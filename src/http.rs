//! HTTP Adapter: the only surface exposed to callers. Translates multipart
//! uploads and query parameters into a `transcribe_async` call and shapes the
//! JSON response; `SttError`'s `IntoResponse` impl is the sole place status
//! codes get decided.

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::SttError;
use crate::service::SttService;
use crate::types::{AudioInput, ComputeChoice, DeviceChoice, Segment, Task, TranscribeOptions, TranscriptionResult};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SttService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/transcribe", post(transcribe_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct TranscribeQuery {
    #[serde(default = "default_model")]
    model_name: String,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    compute_type: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    vad_filter: Option<bool>,
    #[serde(default)]
    beam_size: Option<u32>,
    #[serde(default)]
    return_meta: Option<bool>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    #[serde(default)]
    decode_wav_bytes: Option<bool>,
}

fn default_model() -> String {
    "base".to_string()
}

#[derive(Debug, Serialize)]
struct SegmentJson {
    start: f64,
    end: f64,
    text: String,
}

impl From<&Segment> for SegmentJson {
    fn from(s: &Segment) -> Self {
        Self {
            start: s.start,
            end: s.end,
            text: s.text.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum TranscribeResponse {
    Text {
        text: String,
    },
    WithMeta {
        text: String,
        language: Option<String>,
        language_probability: Option<f64>,
        duration_seconds: Option<f64>,
        segments: Vec<SegmentJson>,
        model_used: Option<String>,
    },
}

impl From<TranscriptionResult> for TranscribeResponse {
    fn from(result: TranscriptionResult) -> Self {
        match result {
            TranscriptionResult::Text(text) => TranscribeResponse::Text { text },
            TranscriptionResult::WithMeta {
                text,
                language,
                language_probability,
                duration_seconds,
                segments,
                model_used,
            } => TranscribeResponse::WithMeta {
                text,
                language,
                language_probability,
                duration_seconds,
                segments: segments.iter().map(SegmentJson::from).collect(),
                model_used,
            },
        }
    }
}

async fn transcribe_handler(
    State(state): State<AppState>,
    Query(query): Query<TranscribeQuery>,
    mut multipart: Multipart,
) -> axum::response::Response {
    match run_transcription(state, query, &mut multipart).await {
        Ok(response) => (axum::http::StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run_transcription(
    state: AppState,
    query: TranscribeQuery,
    multipart: &mut Multipart,
) -> Result<TranscribeResponse, SttError> {
    let audio_bytes = read_audio_field(multipart).await?;

    let device_choice = query
        .device
        .as_deref()
        .map(DeviceChoice::parse)
        .unwrap_or(DeviceChoice::Auto);
    let compute_choice = query
        .compute_type
        .as_deref()
        .map(ComputeChoice::parse)
        .unwrap_or(ComputeChoice::Auto);

    let options = TranscribeOptions {
        language: query.language,
        task: query.task.as_deref().map(Task::parse).unwrap_or(Task::Transcribe),
        vad_filter: query.vad_filter.unwrap_or(true),
        beam_size: query.beam_size.unwrap_or(5),
        return_meta: query.return_meta.unwrap_or(true),
        duration_seconds: query.duration_seconds.unwrap_or(0.0),
        decode_wav_bytes: query.decode_wav_bytes.unwrap_or(true),
    };

    let input = AudioInput::Bytes(audio_bytes);

    let result = state
        .service
        .transcribe_async(&query.model_name, device_choice, compute_choice, input, options)
        .await?;

    Ok(result.into())
}

async fn read_audio_field(multipart: &mut Multipart) -> Result<Vec<u8>, SttError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SttError::InvalidArgument(format!("multipart error: {e}")))?
    {
        if field.name() == Some("audio") || field.file_name().is_some() {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| SttError::InvalidArgument(format!("reading upload field: {e}")))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(SttError::InvalidArgument("no audio file field in multipart body".to_string()))
}
