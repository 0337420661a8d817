//! Async Facade: the single entry point that ties resource admission, the
//! model registry, the concurrency gate and the inference driver together
//! into one `transcribe_async` call.
//!
//! Step order matters and is fixed here rather than left to callers:
//! resolve device/compute, admit against estimated cost, acquire the
//! model (constructing it on first use), acquire a concurrency permit,
//! run inference, then shape the result. Moving admission after model
//! construction would let an uncapped number of callers pile into
//! `get_or_create` before any of them are rejected.

use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::config::DEFAULT_AUDIO_MINUTES_FALLBACK;
use crate::error::SttError;
use crate::hw_probe::resolve_auto_device_compute;
use crate::registry::ModelRegistry;
use crate::resources::ResourceManager;
use crate::types::{AudioInput, ComputeChoice, Device, DeviceChoice, ModelKey, TranscriptionResult};

pub struct SttService {
    resources: Arc<ResourceManager>,
    registry: Arc<ModelRegistry>,
}

impl SttService {
    pub fn new(resources: Arc<ResourceManager>, registry: Arc<ModelRegistry>) -> Self {
        Self { resources, registry }
    }

    /// Run one transcription end to end: admission, model acquisition,
    /// concurrency gating, inference, and result shaping.
    pub async fn transcribe_async(
        &self,
        model_name: &str,
        device_choice: DeviceChoice,
        compute_choice: ComputeChoice,
        input: AudioInput,
        options: crate::types::TranscribeOptions,
    ) -> Result<TranscriptionResult, SttError> {
        let (device, compute_type) = resolve_auto_device_compute(device_choice, compute_choice).await;
        let key = ModelKey {
            model_name: model_name.to_string(),
            device,
            compute_type,
        };

        let is_loaded = self.registry.is_loaded(&key).await;
        let audio_minutes = if options.duration_seconds > 0.0 {
            options.duration_seconds / 60.0
        } else {
            DEFAULT_AUDIO_MINUTES_FALLBACK
        };

        let estimate = self
            .resources
            .admit_or_fail(
                device,
                &key.model_name,
                compute_type.as_str(),
                audio_minutes,
                options.beam_size,
                is_loaded,
            )
            .await?;

        let use_gpu = device == Device::Cuda;
        let model = self.registry.get_or_create(&key, use_gpu).await?;

        let snapshot = self.resources.probe().await;
        let permits = self.resources.concurrency_hint(device, estimate, &snapshot);
        let semaphore = self.registry.get_semaphore(&key, permits).await;
        let _permit: OwnedSemaphorePermit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| SttError::InferenceFailed("concurrency gate semaphore closed".to_string()))?;

        let model_used = model.name().to_string();
        let raw = crate::inference::transcribe_with_model(model, input, options.clone()).await?;

        Ok(shape_result(raw, options.return_meta, model_used))
    }
}

fn shape_result(raw: crate::types::RawTranscription, return_meta: bool, model_used: String) -> TranscriptionResult {
    let text = raw
        .segments
        .iter()
        .map(|s| s.text.trim())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    if return_meta {
        TranscriptionResult::WithMeta {
            text,
            language: raw.language,
            language_probability: raw.language_probability,
            duration_seconds: raw.duration_seconds,
            segments: raw.segments,
            model_used: Some(model_used),
        }
    } else {
        TranscriptionResult::Text(text)
    }
}
