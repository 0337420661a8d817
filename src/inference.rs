//! Inference Driver: turns normalised audio plus a loaded model into a
//! `RawTranscription`, running the blocking model call off the async
//! runtime's worker threads.

use std::sync::Arc;

use crate::audio::{self, PreparedAudio};
use crate::error::SttError;
use crate::model::AcousticModel;
use crate::types::{AudioInput, RawTranscription, TranscribeOptions};

/// Normalise `input`, then run `model.transcribe` on a blocking thread.
///
/// The temp-file guard (if any) is kept alive for the duration of the
/// blocking call and dropped only after it returns, so a model that reads
/// audio from disk never sees the file disappear mid-inference.
pub async fn transcribe_with_model(
    model: Arc<dyn AcousticModel>,
    input: AudioInput,
    options: TranscribeOptions,
) -> Result<RawTranscription, SttError> {
    let (prepared, guard) = audio::prepare(input, options.decode_wav_bytes)?;

    let samples = match prepared {
        PreparedAudio::Samples(samples) => samples,
        PreparedAudio::Path(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| SttError::InputIo(format!("reading prepared audio file: {e}")))?;
            match audio::decode_wav_bytes_to_samples(&bytes, 16_000) {
                Ok(samples) => samples,
                Err(_) => {
                    // Not a canonical WAV (e.g. MP3 bytes that fell back to a
                    // temp file in `audio::prepare`): hand the file to the
                    // general-purpose decoder instead of failing a second
                    // time on the same assumption.
                    let path = path.clone();
                    tokio::task::spawn_blocking(move || audio::decode_any_file_to_samples(&path, 16_000))
                        .await
                        .map_err(|e| SttError::InferenceFailed(format!("join error: {e}")))??
                }
            }
        }
    };

    let result = tokio::task::spawn_blocking(move || model.transcribe(&samples, &options))
        .await
        .map_err(|e| SttError::InferenceFailed(format!("join error: {e}")))?;

    drop(guard);
    result
}
