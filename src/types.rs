//! Shared value types for the STT serving control plane.
//!
//! Everything here is a plain data type — no I/O, no locking. Keeping these
//! free of behaviour means they can be constructed and compared freely in
//! tests without touching the registry, the resource manager, or a model.

use std::path::PathBuf;

/// The three device/compute knobs accepted at the HTTP boundary, before
/// `auto` has been resolved to a concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    Auto,
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeChoice {
    Auto,
    Float32,
    Float16,
    Int8,
}

impl DeviceChoice {
    pub fn parse(s: &str) -> Self {
        match s {
            "cpu" => DeviceChoice::Cpu,
            "cuda" => DeviceChoice::Cuda,
            _ => DeviceChoice::Auto,
        }
    }
}

impl ComputeChoice {
    pub fn parse(s: &str) -> Self {
        match s {
            "float32" => ComputeChoice::Float32,
            "float16" => ComputeChoice::Float16,
            "int8" => ComputeChoice::Int8,
            _ => ComputeChoice::Auto,
        }
    }
}

/// Canonical, fully-resolved device. `auto` is never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, fully-resolved compute precision. `auto` is never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeType {
    Float32,
    Float16,
    Int8,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Float32 => "float32",
            ComputeType::Float16 => "float16",
            ComputeType::Int8 => "int8",
        }
    }
}

impl std::fmt::Display for ComputeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical `(model_name, device, compute_type)` triple identifying one
/// loaded model instance. Immutable, hashable, and never contains `auto`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub model_name: String,
    pub device: Device,
    pub compute_type: ComputeType,
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.model_name, self.device, self.compute_type)
    }
}

/// Capacity observations taken at one instant. Consumed and discarded — a
/// snapshot is never mutated once built.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    pub gpu_present: bool,
    pub gpu_total_gb: f64,
    pub gpu_free_gb: f64,
    pub ram_total_gb: f64,
    pub ram_available_gb: f64,
}

/// Estimated memory cost of serving one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub resident_gb: f64,
    pub transient_gb: f64,
}

/// Transcription task requested of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Transcribe,
    Translate,
}

impl Task {
    pub fn parse(s: &str) -> Self {
        match s {
            "translate" => Task::Translate,
            _ => Task::Transcribe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Transcribe => "transcribe",
            Task::Translate => "translate",
        }
    }
}

/// Fully-merged request options, after defaults have been applied by the
/// facade. See [`TranscribeOptions::with_defaults`].
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub task: Task,
    pub vad_filter: bool,
    pub beam_size: u32,
    pub return_meta: bool,
    pub duration_seconds: f64,
    pub decode_wav_bytes: bool,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: None,
            task: Task::Transcribe,
            vad_filter: true,
            beam_size: 5,
            return_meta: false,
            duration_seconds: 0.0,
            decode_wav_bytes: true,
        }
    }
}

/// Tagged union of the three ways audio can reach the normaliser.
#[derive(Debug, Clone)]
pub enum AudioInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Samples(Vec<f32>),
}

/// One decoded transcript segment with its timing.
#[derive(Debug, Clone)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// What the inference library hands back for one call: segment texts plus
/// whatever metadata it inferred about the audio (language, duration, ...).
#[derive(Debug, Clone)]
pub struct RawTranscription {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
    pub language_probability: Option<f64>,
    pub duration_seconds: Option<f64>,
}

/// The public result of a transcription request.
#[derive(Debug, Clone)]
pub enum TranscriptionResult {
    Text(String),
    WithMeta {
        text: String,
        language: Option<String>,
        language_probability: Option<f64>,
        duration_seconds: Option<f64>,
        segments: Vec<Segment>,
        model_used: Option<String>,
    },
}
