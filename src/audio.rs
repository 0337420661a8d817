//! Audio Input Normaliser.
//!
//! Converts a path, an opaque byte buffer, or a raw sample array into
//! something `whisper-rs` can consume: either a file path or a float32 mono
//! 16 kHz waveform. WAV PCM (8/16/24/32-bit, mono or multi-channel) is
//! decoded in memory when possible; anything else falls back to a temp file.
//!
//! Temp files are represented by [`PreparedAudio::Samples`]/[`PreparedAudio::Path`]
//! plus an optional [`TempGuard`] whose `Drop` impl deletes the file on every
//! exit path — success, error, or the caller being cancelled mid-`await`.

use std::io::Write;
use std::path::PathBuf;

use crate::error::SttError;

/// What the inference driver actually feeds to the model.
pub enum PreparedAudio {
    Path(PathBuf),
    Samples(Vec<f32>),
}

/// RAII guard for a temp file created by the normaliser. Deleting is
/// best-effort: unlink failures are swallowed, matching `SPEC_FULL.md` §7.
pub struct TempGuard(Option<PathBuf>);

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Normalise `input` into something the driver can pass to a model.
///
/// Returns the prepared audio plus a guard that deletes any temp file it
/// created once dropped. Callers must keep the guard alive for exactly as
/// long as the prepared audio might still be read from disk.
pub fn prepare(input: crate::types::AudioInput, decode_wav_bytes: bool) -> Result<(PreparedAudio, TempGuard), SttError> {
    use crate::types::AudioInput;

    match input {
        AudioInput::Path(path) => {
            if !path.exists() {
                return Err(SttError::InvalidArgument(format!(
                    "audio file not found: {}",
                    path.display()
                )));
            }
            Ok((PreparedAudio::Path(path), TempGuard(None)))
        }
        AudioInput::Bytes(bytes) => {
            if decode_wav_bytes {
                match decode_wav_bytes_to_samples(&bytes, 16_000) {
                    Ok(samples) => return Ok((PreparedAudio::Samples(samples), TempGuard(None))),
                    Err(_) => {
                        // Fall through to the temp-file path below.
                        tracing::debug!(component = "audio_normaliser", "in-memory WAV decode failed, falling back to temp file");
                    }
                }
            }
            let path = write_temp_file(&bytes)?;
            Ok((PreparedAudio::Path(path.clone()), TempGuard(Some(path))))
        }
        AudioInput::Samples(samples) => {
            // `AudioInput::Samples` is always 1-D by construction in Rust —
            // the "must be 1-D" check in the source spec exists to guard
            // against a dynamically-typed ndarray. HTTP callers never reach
            // this arm; only direct facade callers passing raw samples do.
            if samples.iter().any(|s| s.abs() > 1.0) {
                tracing::warn!(
                    component = "audio_normaliser",
                    "sample array has values outside [-1.0, 1.0]; not clipped"
                );
            }
            tracing::warn!(
                component = "audio_normaliser",
                "caller must ensure the sample array is 16kHz mono"
            );
            Ok((PreparedAudio::Samples(samples), TempGuard(None)))
        }
    }
}

fn write_temp_file(bytes: &[u8]) -> Result<PathBuf, SttError> {
    let mut path = std::env::temp_dir();
    let unique = format!(
        "whisper-stt-{}-{}.wav",
        std::process::id(),
        fastrand_like_suffix()
    );
    path.push(unique);
    let mut file = std::fs::File::create(&path)
        .map_err(|e| SttError::InputIo(format!("failed to create temp file: {e}")))?;
    file.write_all(bytes)
        .map_err(|e| SttError::InputIo(format!("failed to write temp file: {e}")))?;
    Ok(path)
}

/// A lightweight, dependency-free unique suffix: PID is already in the
/// filename, so a monotonically-increasing counter is enough to avoid
/// collisions between two uploads handled by the same process tick.
fn fastrand_like_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// In-memory WAV decode
// ---------------------------------------------------------------------------

struct WavHeader {
    channels: u16,
    sample_width_bytes: u16,
    frame_rate: u32,
    data_offset: usize,
    data_len: usize,
}

/// Parse a canonical RIFF/WAVE header, returning the byte offset and length
/// of the `data` chunk. Rejects anything that isn't `RIFF....WAVEfmt `.
fn parse_wav_header(bytes: &[u8]) -> Option<WavHeader> {
    if bytes.len() < 44 {
        return None;
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut pos = 12usize;
    let mut channels = None;
    let mut frame_rate = None;
    let mut sample_width_bytes = None;
    let mut data_offset = None;
    let mut data_len = None;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().ok()?) as usize;
        let body_start = pos + 8;

        if chunk_id == b"fmt " {
            if body_start + 16 > bytes.len() {
                return None;
            }
            let n_channels = u16::from_le_bytes(bytes[body_start + 2..body_start + 4].try_into().ok()?);
            let sample_rate = u32::from_le_bytes(bytes[body_start + 4..body_start + 8].try_into().ok()?);
            let bits_per_sample = u16::from_le_bytes(bytes[body_start + 14..body_start + 16].try_into().ok()?);
            channels = Some(n_channels);
            frame_rate = Some(sample_rate);
            sample_width_bytes = Some(bits_per_sample / 8);
        } else if chunk_id == b"data" {
            let available = bytes.len().saturating_sub(body_start);
            let len = chunk_size.min(available);
            data_offset = Some(body_start);
            data_len = Some(len);
        }

        // Chunks are word-aligned: an odd chunk_size has one padding byte.
        let advance = chunk_size + (chunk_size & 1);
        pos = body_start + advance;
    }

    Some(WavHeader {
        channels: channels?,
        sample_width_bytes: sample_width_bytes?,
        frame_rate: frame_rate?,
        data_offset: data_offset?,
        data_len: data_len?,
    })
}

/// Decode WAV PCM bytes to mono float32 in `[-1, 1]`, resampled to
/// `target_sr`. Returns `Err` for anything that isn't canonical PCM with a
/// supported sample width — callers fall back to the temp-file path.
pub fn decode_wav_bytes_to_samples(bytes: &[u8], target_sr: u32) -> Result<Vec<f32>, SttError> {
    let header = parse_wav_header(bytes)
        .ok_or_else(|| SttError::InvalidArgument("not a canonical WAV file".to_string()))?;

    let data = &bytes[header.data_offset..header.data_offset + header.data_len];
    let channels = header.channels.max(1) as usize;

    let mono: Vec<f32> = match header.sample_width_bytes {
        1 => data.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect::<Vec<_>>().pipe_downmix(channels),
        2 => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect::<Vec<_>>()
            .pipe_downmix(channels),
        3 => data
            .chunks_exact(3)
            .map(|c| {
                let unsigned = (c[0] as i32) | ((c[1] as i32) << 8) | ((c[2] as i32) << 16);
                let sign_extended = if unsigned & 0x0080_0000 != 0 {
                    unsigned - 0x0100_0000
                } else {
                    unsigned
                };
                sign_extended as f32 / 8_388_608.0 // 2^23
            })
            .collect::<Vec<_>>()
            .pipe_downmix(channels),
        4 => data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0)
            .collect::<Vec<_>>()
            .pipe_downmix(channels),
        other => {
            return Err(SttError::InvalidArgument(format!(
                "unsupported WAV sample width: {other} bytes"
            )))
        }
    };

    let clipped: Vec<f32> = mono.into_iter().map(|s| s.clamp(-1.0, 1.0)).collect();

    Ok(if header.frame_rate == target_sr {
        clipped
    } else {
        resample_linear(&clipped, header.frame_rate, target_sr)
    })
}

/// Downmix helper: averages interleaved frames of `channels` samples each.
trait Downmix {
    fn pipe_downmix(self, channels: usize) -> Vec<f32>;
}

impl Downmix for Vec<f32> {
    fn pipe_downmix(self, channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return self;
        }
        self.chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Linear-interpolation resampler on a uniform `[0, 1)` grid, matching the
/// cheap-quality tradeoff described in `SPEC_FULL.md` §4.C.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }

    let new_len = ((input.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize).max(1);
    let old_len = input.len();

    (0..new_len)
        .map(|i| {
            // x_old and x_new are both uniform grids on [0, 1) without the
            // endpoint, so position i of the new grid maps to:
            let src_pos = (i as f64 / new_len as f64) * old_len as f64;
            let idx = src_pos.floor() as usize;
            let frac = (src_pos - idx as f64) as f32;
            let a = input[idx.min(old_len - 1)];
            let b = input[(idx + 1).min(old_len - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Decode an arbitrary audio file (MP3 and anything else `symphonia` probes)
/// to mono float32, resampled to `target_sr`. This is the fallback used for
/// the temp-file path once the cheap hand-rolled WAV decoder has already
/// been tried and failed — a canonical WAV is decoded above without paying
/// for a probe; anything else goes through here.
pub fn decode_any_file_to_samples(path: &std::path::Path, target_sr: u32) -> Result<Vec<f32>, SttError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path).map_err(|e| SttError::InputIo(format!("opening audio file: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let probed = symphonia::default::get_probe()
        .format(&Hint::new(), mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SttError::InvalidArgument(format!("unrecognised audio format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| SttError::InvalidArgument("audio file has no decodable track".to_string()))?;
    let source_sr = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SttError::InvalidArgument("audio track has no known sample rate".to_string()))?;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SttError::InvalidArgument(format!("unsupported audio codec: {e}")))?;

    let mut mono = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(component = "audio_normaliser", "skipping undecodable packet: {e}");
                continue;
            }
        };
        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        mono.extend(sample_buf.samples().to_vec().pipe_downmix(channels));
    }

    if mono.is_empty() {
        return Err(SttError::InvalidArgument("audio file decoded to zero samples".to_string()));
    }

    let clipped: Vec<f32> = mono.into_iter().map(|s| s.clamp(-1.0, 1.0)).collect();
    Ok(resample_linear(&clipped, source_sr, target_sr))
}

fn build_wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    // i16 PCM mono, for test fixtures only.
    let mut out = Vec::new();
    let data_len = samples.len() * 2;
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioInput;

    #[test]
    fn decode_16bit_mono_16k_is_identity() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 / 1600.0) - 0.5).collect();
        let wav = build_wav_bytes(&samples, 16_000);
        let decoded = decode_wav_bytes_to_samples(&wav, 16_000).unwrap();
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 0.001, "{a} vs {b}");
        }
    }

    #[test]
    fn decode_resamples_when_rate_differs() {
        let samples = vec![0.0f32; 480];
        let wav = build_wav_bytes(&samples, 48_000);
        let decoded = decode_wav_bytes_to_samples(&wav, 16_000).unwrap();
        assert_eq!(decoded.len(), 160);
    }

    #[test]
    fn decode_stereo_averages_channels() {
        // Build a 2-channel, 16-bit WAV by hand: L=1.0, R=-1.0 repeated.
        let mut out = Vec::new();
        let frames = 100u32;
        let data_len = frames as usize * 2 * 2;
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes()); // stereo
        out.extend_from_slice(&16_000u32.to_le_bytes());
        out.extend_from_slice(&(16_000u32 * 4).to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_len as u32).to_le_bytes());
        for _ in 0..frames {
            out.extend_from_slice(&32767i16.to_le_bytes());
            out.extend_from_slice(&(-32768i16).to_le_bytes());
        }
        let decoded = decode_wav_bytes_to_samples(&out, 16_000).unwrap();
        assert_eq!(decoded.len(), frames as usize);
        for s in decoded {
            assert!(s.abs() < 0.01, "expected ~0.0 after averaging L/R, got {s}");
        }
    }

    #[test]
    fn decode_24bit_sign_extends_negative_samples() {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + 3u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&16_000u32.to_le_bytes());
        out.extend_from_slice(&(16_000u32 * 3).to_le_bytes());
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&3u32.to_le_bytes());
        // -1 in 24-bit two's complement: 0xFFFFFF
        out.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        let decoded = decode_wav_bytes_to_samples(&out, 16_000).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!((decoded[0] - (-1.0 / 8_388_608.0 * 8_388_608.0 / 8_388_608.0)).abs() < 1e-4);
        assert!(decoded[0] < 0.0);
    }

    #[test]
    fn decode_rejects_unsupported_sample_width() {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&16_000u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&40u16.to_le_bytes()); // 5-byte samples: unsupported
        out.extend_from_slice(b"data");
        out.extend_from_slice(&0u32.to_le_bytes());
        assert!(decode_wav_bytes_to_samples(&out, 16_000).is_err());
    }

    #[test]
    fn decode_rejects_non_wav_bytes() {
        let mp3ish = vec![0xFFu8, 0xFB, 0x90, 0x00, 0x01, 0x02, 0x03];
        assert!(decode_wav_bytes_to_samples(&mp3ish, 16_000).is_err());
    }

    #[test]
    fn decode_any_file_rejects_garbage_with_invalid_argument() {
        let tmp = std::env::temp_dir().join("whisper-stt-test-garbage.bin");
        std::fs::write(&tmp, b"not any known audio container").unwrap();
        let err = decode_any_file_to_samples(&tmp, 16_000).unwrap_err();
        assert!(matches!(err, SttError::InvalidArgument(_)));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn decode_any_file_decodes_a_real_wav_via_symphonia() {
        // symphonia probes WAV itself, independent of our hand-rolled decoder.
        let samples = vec![0.25f32; 1600];
        let wav = build_wav_bytes(&samples, 16_000);
        let tmp = std::env::temp_dir().join("whisper-stt-test-symphonia.wav");
        std::fs::write(&tmp, &wav).unwrap();
        let decoded = decode_any_file_to_samples(&tmp, 16_000).unwrap();
        assert!(!decoded.is_empty());
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn prepare_missing_path_fails() {
        let input = AudioInput::Path(PathBuf::from("/nonexistent/definitely/missing.wav"));
        let err = prepare(input, true).unwrap_err();
        assert!(matches!(err, SttError::InvalidArgument(_)));
    }

    #[test]
    fn prepare_existing_path_yields_same_path() {
        let tmp = std::env::temp_dir().join("whisper-stt-test-existing.wav");
        std::fs::write(&tmp, b"not really a wav").unwrap();
        let input = AudioInput::Path(tmp.clone());
        let (prepared, _guard) = prepare(input, true).unwrap();
        match prepared {
            PreparedAudio::Path(p) => assert_eq!(p, tmp),
            _ => panic!("expected Path variant"),
        }
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn prepare_wav_bytes_decodes_in_memory() {
        let samples = vec![0.25f32; 1600];
        let wav = build_wav_bytes(&samples, 16_000);
        let input = AudioInput::Bytes(wav);
        let (prepared, _guard) = prepare(input, true).unwrap();
        assert!(matches!(prepared, PreparedAudio::Samples(_)));
    }

    #[test]
    fn prepare_non_wav_bytes_falls_back_to_temp_file_and_cleans_up() {
        let input = AudioInput::Bytes(vec![0xFFu8, 0xFB, 0x90, 0x00]);
        let (prepared, guard) = prepare(input, true).unwrap();
        let path = match prepared {
            PreparedAudio::Path(p) => p,
            _ => panic!("expected Path fallback"),
        };
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists(), "temp file should be deleted once the guard drops");
    }

    #[test]
    fn prepare_bytes_with_decode_disabled_always_writes_temp_file() {
        let samples = vec![0.0f32; 160];
        let wav = build_wav_bytes(&samples, 16_000);
        let (prepared, guard) = prepare(crate::types::AudioInput::Bytes(wav), false).unwrap();
        assert!(matches!(prepared, PreparedAudio::Path(_)));
        drop(guard);
    }

    #[test]
    fn prepare_samples_pass_through_unchanged() {
        let samples = vec![0.1f32, 0.2, 0.3];
        let (prepared, _guard) = prepare(AudioInput::Samples(samples.clone()), true).unwrap();
        match prepared {
            PreparedAudio::Samples(s) => assert_eq!(s, samples),
            _ => panic!("expected Samples passthrough"),
        }
    }

    #[test]
    fn resample_identity_when_rates_match() {
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_length_matches_round_formula() {
        let input = vec![0.0f32; 441_00];
        let out = resample_linear(&input, 44_100, 16_000);
        let expected = (441_00f64 * 16_000.0 / 44_100.0).round() as usize;
        assert!(out.len().abs_diff(expected) <= 1);
    }
}
