//! Hardware probing: GPU VRAM and system RAM, plus `auto` resolution.
//!
//! Both queries are side-effect-free and cheap enough to call per request.
//! Absence of information (no GPU, probe failure) is reported as `None` —
//! never as an error.

use sysinfo::System;

use crate::types::{ComputeChoice, ComputeType, Device, DeviceChoice};

/// `(total_gb, free_gb)` for the first visible GPU, or `None` if absent or
/// unreadable. Best-effort: shells out to `nvidia-smi`; any spawn failure,
/// non-zero exit, or unparsable output resolves to `None`.
pub async fn gpu_memory_gb() -> Option<(f64, f64)> {
    let output = tokio::process::Command::new("nvidia-smi")
        .args([
            "--query-gpu=memory.total,memory.free",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next()?;
    parse_nvidia_smi_line(first_line)
}

fn parse_nvidia_smi_line(line: &str) -> Option<(f64, f64)> {
    let mut parts = line.split(',').map(|s| s.trim());
    let total_mib: f64 = parts.next()?.parse().ok()?;
    let free_mib: f64 = parts.next()?.parse().ok()?;
    const MIB_PER_GB: f64 = 1024.0;
    Some((total_mib / MIB_PER_GB, free_mib / MIB_PER_GB))
}

/// `(total_gb, available_gb)` of system RAM. Always succeeds — `sysinfo`
/// has no failure mode worth distinguishing from "zero memory" on this path.
pub fn ram_gb() -> Option<(f64, f64)> {
    let mut sys = System::new();
    sys.refresh_memory();
    const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let total_gb = sys.total_memory() as f64 / BYTES_PER_GB;
    let available_gb = sys.available_memory() as f64 / BYTES_PER_GB;
    Some((total_gb, available_gb))
}

/// Resolve `auto` device/compute choices against live GPU presence.
///
/// `auto` device resolves to `cuda` iff a GPU is present, else `cpu`.
/// `auto` compute resolves to `float16` on GPU, else `float32`.
pub async fn resolve_auto_device_compute(
    device: DeviceChoice,
    compute: ComputeChoice,
) -> (Device, ComputeType) {
    let resolved_device = match device {
        DeviceChoice::Cpu => Device::Cpu,
        DeviceChoice::Cuda => Device::Cuda,
        DeviceChoice::Auto => {
            if gpu_memory_gb().await.is_some() {
                Device::Cuda
            } else {
                Device::Cpu
            }
        }
    };

    let resolved_compute = match compute {
        ComputeChoice::Float32 => ComputeType::Float32,
        ComputeChoice::Float16 => ComputeType::Float16,
        ComputeChoice::Int8 => ComputeType::Int8,
        ComputeChoice::Auto => match resolved_device {
            Device::Cuda => ComputeType::Float16,
            Device::Cpu => ComputeType::Float32,
        },
    };

    (resolved_device, resolved_compute)
}
