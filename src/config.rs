//! Static tunables and process-wide configuration.
//!
//! The memory tables below are heuristics, not measurements — see
//! `SPEC_FULL.md` §4.B. They are read-only after startup, matching the
//! original Python `config.py` module this crate generalises.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Approximate resident memory footprint (GB) by model size.
pub fn model_resident_gb(model_name: &str) -> f64 {
    match model_name {
        "tiny" => 0.7,
        "base" => 1.4,
        "small" => 2.5,
        "medium" => 5.0,
        "large" => 10.0,
        "large-v2" => 11.0,
        "large-v3" => 12.0,
        _ => 2.0,
    }
}

/// Compute-type multiplier applied to the resident footprint.
pub fn compute_multiplier(compute: &str) -> f64 {
    match compute {
        "float32" => 2.0,
        "float16" => 1.0,
        "int8" => 0.6,
        _ => 1.0,
    }
}

/// Transient per-inference footprint per minute of audio (GB) by model.
pub fn transient_per_min_gb(model_name: &str) -> f64 {
    match model_name {
        "tiny" => 0.2,
        "base" => 0.2,
        "small" => 0.3,
        "medium" => 0.5,
        "large" => 0.8,
        "large-v2" => 0.9,
        "large-v3" => 1.0,
        _ => 0.3,
    }
}

/// Beam size baseline transient estimates scale against.
pub const DEFAULT_BEAM_BASELINE: u32 = 5;

/// VRAM kept free in admission checks, never counted as available.
pub const GPU_VRAM_MARGIN_GB: f64 = 1.5;
/// System RAM kept free in admission checks, never counted as available.
pub const CPU_RAM_MARGIN_GB: f64 = 2.0;

/// Per-model concurrency cap used when a resource snapshot gives no usable
/// signal (device absent, transient estimate effectively zero).
pub const DEFAULT_GPU_CONCURRENCY: usize = 1;
pub const DEFAULT_CPU_CONCURRENCY: usize = 2;

/// Conservative fallback used when a caller supplies no `duration_seconds`.
pub const DEFAULT_AUDIO_MINUTES_FALLBACK: f64 = 1.0;

/// Command-line configuration for the server binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "whisper-stt-server", version, about = "Resource-aware Whisper STT serving control plane")]
pub struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Directory holding (or receiving) GGML model files, named `ggml-<model_name>.bin`.
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Base URL models are downloaded from when missing on disk, e.g.
    /// `https://huggingface.co/ggerganov/whisper.cpp/resolve/main`.
    #[arg(long, default_value = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main")]
    pub model_base_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_have_resident_cost() {
        assert_eq!(model_resident_gb("tiny"), 0.7);
        assert_eq!(model_resident_gb("large-v3"), 12.0);
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        assert_eq!(model_resident_gb("ultra-large-v9"), 2.0);
        assert_eq!(transient_per_min_gb("ultra-large-v9"), 0.3);
    }

    #[test]
    fn compute_multiplier_known_values() {
        assert_eq!(compute_multiplier("float32"), 2.0);
        assert_eq!(compute_multiplier("int8"), 0.6);
        assert_eq!(compute_multiplier("bogus"), 1.0);
    }
}
