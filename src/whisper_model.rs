//! Production `AcousticModel`: a `whisper-rs` context plus the file-path
//! resolution and download-if-missing logic needed to build one.
//!
//! `whisper-rs`'s `WhisperContext` and `WhisperState` are not `Send`/`Sync`
//! by default; the crate itself documents that its FFI types are safe to
//! share across threads as long as only one inference runs at a time, which
//! is exactly what the registry's per-key semaphore guarantees. We rely on
//! that guarantee here rather than re-deriving it.

use std::path::{Path, PathBuf};

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::SttError;
use crate::model::AcousticModel;
use crate::types::{RawTranscription, Segment, TranscribeOptions};

pub struct WhisperRsModel {
    name: String,
    context: WhisperContext,
}

// Safety: whisper.cpp serialises all state access internally and this crate
// never calls `transcribe` concurrently on the same model without the
// registry's semaphore limiting to its configured concurrency.
unsafe impl Send for WhisperRsModel {}
unsafe impl Sync for WhisperRsModel {}

impl WhisperRsModel {
    /// Load a GGML model file from `path` with GPU enabled when `use_gpu`.
    /// Blocking: whisper.cpp's context construction reads and mmaps the
    /// model file synchronously.
    pub fn load(name: &str, path: &Path, use_gpu: bool) -> Result<Self, SttError> {
        let mut params = WhisperContextParameters::default();
        params.use_gpu(use_gpu);

        let path_str = path
            .to_str()
            .ok_or_else(|| SttError::ModelLoadFailed(format!("non-UTF8 model path: {}", path.display())))?;

        let context = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| SttError::ModelLoadFailed(format!("{name}: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            context,
        })
    }
}

impl AcousticModel for WhisperRsModel {
    fn transcribe(&self, samples: &[f32], options: &TranscribeOptions) -> Result<RawTranscription, SttError> {
        let mut state = self
            .context
            .create_state()
            .map_err(|e| SttError::InferenceFailed(format!("create_state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: options.beam_size as i32,
            patience: -1.0,
        });
        params.set_translate(options.task == crate::types::Task::Translate);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        if let Some(lang) = &options.language {
            params.set_language(Some(lang.as_str()));
        }
        if !options.vad_filter {
            tracing::debug!(
                component = "whisper_model",
                "vad_filter=false requested; whisper.cpp VAD requires a separate VAD model file not wired up here, so silence is never explicitly skipped either way"
            );
        }

        state
            .full(params, samples)
            .map_err(|e| SttError::InferenceFailed(format!("full: {e}")))?;

        let n_segments = state.full_n_segments();

        let mut segments = Vec::with_capacity(n_segments as usize);
        for i in 0..n_segments {
            let segment = state
                .get_segment(i)
                .ok_or_else(|| SttError::InferenceFailed(format!("missing segment {i}")))?;
            let text = segment
                .to_str_lossy()
                .map_err(|e| SttError::InferenceFailed(format!("segment {i} text: {e}")))?
                .to_string();
            let start = segment.start_timestamp() as f64 / 100.0;
            let end = segment.end_timestamp() as f64 / 100.0;
            segments.push(Segment { start, end, text });
        }

        let duration_seconds = segments.last().map(|s| s.end);

        Ok(RawTranscription {
            segments,
            language: options.language.clone(),
            language_probability: None,
            duration_seconds,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Resolve the on-disk path for `model_name`, downloading it from
/// `base_url` into `models_dir` if it is missing. Mirrors the
/// `ggml-<name>.bin` naming convention and the atomic
/// temp-file-then-rename write pattern used elsewhere in this codebase for
/// network downloads.
pub async fn resolve_model_path(models_dir: &Path, model_name: &str, base_url: &str) -> Result<PathBuf, SttError> {
    let filename = format!("ggml-{model_name}.bin");
    let final_path = models_dir.join(&filename);

    if final_path.exists() {
        return Ok(final_path);
    }

    tokio::fs::create_dir_all(models_dir)
        .await
        .map_err(|e| SttError::InputIo(format!("creating models dir: {e}")))?;

    let url = format!("{}/{}", base_url.trim_end_matches('/'), filename);
    tracing::info!(model = model_name, %url, "downloading missing model file");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| SttError::InputIo(format!("downloading {model_name}: {e}")))?;

    if !response.status().is_success() {
        return Err(SttError::InputIo(format!(
            "downloading {model_name} failed with status {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SttError::InputIo(format!("reading download body for {model_name}: {e}")))?;

    let tmp_path = models_dir.join(format!("{filename}.part"));
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| SttError::InputIo(format!("writing temp model file: {e}")))?;
    tokio::fs::rename(&tmp_path, &final_path)
        .await
        .map_err(|e| SttError::InputIo(format!("renaming temp model file into place: {e}")))?;

    Ok(final_path)
}
