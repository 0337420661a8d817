//! The `AcousticModel` abstraction separates the registry/driver from any
//! particular inference backend. Production code only ever constructs
//! `whisper_model::WhisperRsModel`; tests build `MockAcousticModel` instead,
//! matching the split `SttEngine`/`MockSttEngine` pattern this crate is
//! built from.

use crate::error::SttError;
use crate::types::{RawTranscription, TranscribeOptions};

/// A loaded acoustic model capable of transcribing 16kHz mono float32 audio.
///
/// Implementations must be safe to call from a blocking worker thread and
/// safe to share across concurrent callers guarded by the registry's
/// semaphore — `Send + Sync` is required so a model can live inside an
/// `Arc` shared across `spawn_blocking` tasks.
pub trait AcousticModel: Send + Sync {
    /// Run inference on already-normalised 16kHz mono float32 samples.
    /// Blocking: callers must invoke this from a blocking context.
    fn transcribe(&self, samples: &[f32], options: &TranscribeOptions) -> Result<RawTranscription, SttError>;

    /// Human-readable identifier for logs and `model_used` metadata.
    fn name(&self) -> &str;
}

#[cfg(test)]
pub struct MockAcousticModel {
    pub name: String,
    pub fixed_text: String,
    pub fail: bool,
}

#[cfg(test)]
impl MockAcousticModel {
    pub fn new(name: &str, fixed_text: &str) -> Self {
        Self {
            name: name.to_string(),
            fixed_text: fixed_text.to_string(),
            fail: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fixed_text: String::new(),
            fail: true,
        }
    }
}

#[cfg(test)]
impl AcousticModel for MockAcousticModel {
    fn transcribe(&self, samples: &[f32], _options: &TranscribeOptions) -> Result<RawTranscription, SttError> {
        if self.fail {
            return Err(SttError::InferenceFailed("mock model failure".to_string()));
        }
        let duration = samples.len() as f64 / 16_000.0;
        Ok(RawTranscription {
            segments: vec![crate::types::Segment {
                start: 0.0,
                end: duration,
                text: self.fixed_text.clone(),
            }],
            language: Some("en".to_string()),
            language_probability: Some(0.99),
            duration_seconds: Some(duration),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_fixed_text() {
        let model = MockAcousticModel::new("mock-base", "hello world");
        let samples = vec![0.0f32; 16_000];
        let options = TranscribeOptions::default();
        let out = model.transcribe(&samples, &options).unwrap();
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].text, "hello world");
        assert!((out.duration_seconds.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mock_can_simulate_failure() {
        let model = MockAcousticModel::failing("mock-broken");
        let samples = vec![0.0f32; 100];
        let options = TranscribeOptions::default();
        let err = model.transcribe(&samples, &options).unwrap_err();
        assert!(matches!(err, SttError::InferenceFailed(_)));
    }

    #[test]
    fn mock_name_matches_constructor() {
        let model = MockAcousticModel::new("mock-tiny", "");
        assert_eq!(model.name(), "mock-tiny");
    }
}
