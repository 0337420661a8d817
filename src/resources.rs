//! Resource Manager: admission control and concurrency sizing heuristics.
//!
//! The manager never caches snapshots and never holds an actual memory
//! reservation — admission is advisory. The per-model semaphore installed by
//! the registry is the real bound on in-flight inferences; see
//! `SPEC_FULL.md` §4.D and §5.

use crate::config::{
    compute_multiplier, model_resident_gb, transient_per_min_gb, CPU_RAM_MARGIN_GB,
    DEFAULT_BEAM_BASELINE, DEFAULT_CPU_CONCURRENCY, DEFAULT_GPU_CONCURRENCY, GPU_VRAM_MARGIN_GB,
};
use crate::error::SttError;
use crate::hw_probe::{gpu_memory_gb, ram_gb};
use crate::types::{Device, Estimate, ResourceSnapshot};

#[derive(Debug, Clone)]
pub struct ResourceManager {
    gpu_margin_gb: f64,
    ram_margin_gb: f64,
    /// Bypasses the real `nvidia-smi`/`sysinfo` probe with a fixed snapshot
    /// when set. Used by external test harnesses (the admission path has no
    /// other way to drive a deterministic rejection without depending on the
    /// host machine's actual RAM/VRAM).
    fixed_snapshot: Option<ResourceSnapshot>,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self {
            gpu_margin_gb: GPU_VRAM_MARGIN_GB,
            ram_margin_gb: CPU_RAM_MARGIN_GB,
            fixed_snapshot: None,
        }
    }
}

impl ResourceManager {
    /// Build a manager whose `probe()` always returns `snapshot` instead of
    /// querying the host. Used by tests (see `tests/http_integration.rs`'s
    /// admission-rejection scenario) that need a deterministic capacity
    /// reading regardless of what machine they run on.
    pub fn with_fixed_snapshot(snapshot: ResourceSnapshot) -> Self {
        Self {
            fixed_snapshot: Some(snapshot),
            ..Self::default()
        }
    }

    /// One-instant snapshot of hardware capacity.
    pub async fn probe(&self) -> ResourceSnapshot {
        if let Some(snapshot) = &self.fixed_snapshot {
            return snapshot.clone();
        }

        let gpu = gpu_memory_gb().await;
        let ram = ram_gb();
        let (ram_total_gb, ram_available_gb) = ram.unwrap_or((0.0, 0.0));
        match gpu {
            Some((total, free)) => ResourceSnapshot {
                gpu_present: true,
                gpu_total_gb: total,
                gpu_free_gb: free,
                ram_total_gb,
                ram_available_gb,
            },
            None => ResourceSnapshot {
                gpu_present: false,
                gpu_total_gb: 0.0,
                gpu_free_gb: 0.0,
                ram_total_gb,
                ram_available_gb,
            },
        }
    }

    /// Memory estimate for one request, given model, precision, duration and
    /// beam size. Never depends on a snapshot.
    pub fn estimate(
        &self,
        model_name: &str,
        compute_type: &str,
        audio_minutes: f64,
        beam_size: u32,
    ) -> Estimate {
        let resident_gb = model_resident_gb(model_name) * compute_multiplier(compute_type);
        let base_transient = transient_per_min_gb(model_name);
        let beam_scale = (beam_size as f64 / DEFAULT_BEAM_BASELINE as f64).max(1.0);
        let transient_gb = (base_transient * audio_minutes.max(0.2) * beam_scale).max(0.1);
        Estimate {
            resident_gb,
            transient_gb,
        }
    }

    /// Whether `est` fits within the margin-adjusted free capacity for
    /// `device`. `is_loaded` zeroes out the resident cost — invariant 4 in
    /// `SPEC_FULL.md` §8 depends on that monotonicity.
    pub fn can_accept(
        &self,
        device: Device,
        est: Estimate,
        is_loaded: bool,
        snapshot: &ResourceSnapshot,
    ) -> (bool, Option<String>) {
        let resident = if is_loaded { 0.0 } else { est.resident_gb };
        let need = resident + est.transient_gb;

        match device {
            Device::Cuda => {
                if !snapshot.gpu_present {
                    return (false, Some("GPU not present".to_string()));
                }
                let free_vram = (snapshot.gpu_free_gb - self.gpu_margin_gb).max(0.0);
                if need <= free_vram {
                    (true, None)
                } else {
                    (
                        false,
                        Some(format!(
                            "Insufficient VRAM: need ~{need:.2}GB, free ~{free_vram:.2}GB"
                        )),
                    )
                }
            }
            Device::Cpu => {
                let free_ram = (snapshot.ram_available_gb - self.ram_margin_gb).max(0.0);
                if need <= free_ram {
                    (true, None)
                } else {
                    (
                        false,
                        Some(format!(
                            "Insufficient RAM: need ~{need:.2}GB, free ~{free_ram:.2}GB"
                        )),
                    )
                }
            }
        }
    }

    /// How many concurrent inferences `device` can sustain given `est`.
    /// Always `>= 1` for an available device; `0` if GPU was asked for and
    /// none is present.
    pub fn concurrency_hint(&self, device: Device, est: Estimate, snapshot: &ResourceSnapshot) -> usize {
        let transient = est.transient_gb.max(0.1);
        match device {
            Device::Cuda => {
                if !snapshot.gpu_present {
                    return 0;
                }
                let free_vram = (snapshot.gpu_free_gb - self.gpu_margin_gb).max(0.0);
                let hint = (free_vram / transient) as i64;
                if hint >= 1 {
                    hint as usize
                } else {
                    DEFAULT_GPU_CONCURRENCY
                }
            }
            Device::Cpu => {
                let free_ram = (snapshot.ram_available_gb - self.ram_margin_gb).max(0.0);
                let hint = (free_ram / transient) as i64;
                if hint >= 1 {
                    hint as usize
                } else {
                    DEFAULT_CPU_CONCURRENCY
                }
            }
        }
    }

    /// Combine probe + estimate + admission into one call; on rejection,
    /// the snapshot at decision time is attached to the error.
    pub async fn admit_or_fail(
        &self,
        device: Device,
        model_name: &str,
        compute_type: &str,
        audio_minutes: f64,
        beam_size: u32,
        is_loaded: bool,
    ) -> Result<Estimate, SttError> {
        let est = self.estimate(model_name, compute_type, audio_minutes, beam_size);
        let snapshot = self.probe().await;
        let (ok, reason) = self.can_accept(device, est, is_loaded, &snapshot);
        if ok {
            Ok(est)
        } else {
            Err(SttError::ResourceRejected {
                message: reason.unwrap_or_else(|| "insufficient resources".to_string()),
                snapshot,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_snapshot(ram_available_gb: f64) -> ResourceSnapshot {
        ResourceSnapshot {
            gpu_present: false,
            gpu_total_gb: 0.0,
            gpu_free_gb: 0.0,
            ram_total_gb: 32.0,
            ram_available_gb,
        }
    }

    fn gpu_snapshot(gpu_free_gb: f64) -> ResourceSnapshot {
        ResourceSnapshot {
            gpu_present: true,
            gpu_total_gb: 24.0,
            gpu_free_gb,
            ram_total_gb: 32.0,
            ram_available_gb: 16.0,
        }
    }

    #[test]
    fn estimate_unknown_model_uses_fallback() {
        let rm = ResourceManager::default();
        let est = rm.estimate("mystery-model", "float32", 1.0, 5);
        assert_eq!(est.resident_gb, 2.0 * 2.0);
        assert_eq!(est.transient_gb, 0.3);
    }

    #[test]
    fn estimate_clamps_short_audio_to_point_two_minutes() {
        let rm = ResourceManager::default();
        let short = rm.estimate("base", "float32", 0.01, 5);
        let floor = rm.estimate("base", "float32", 0.2, 5);
        assert_eq!(short.transient_gb, floor.transient_gb);
    }

    #[test]
    fn beam_below_baseline_does_not_shrink_transient() {
        let rm = ResourceManager::default();
        let beam1 = rm.estimate("base", "float32", 5.0, 1);
        let beam5 = rm.estimate("base", "float32", 5.0, 5);
        assert_eq!(beam1.transient_gb, beam5.transient_gb);
    }

    #[test]
    fn beam_above_baseline_scales_transient_linearly() {
        let rm = ResourceManager::default();
        let beam5 = rm.estimate("base", "float32", 5.0, 5);
        let beam10 = rm.estimate("base", "float32", 5.0, 10);
        assert!((beam10.transient_gb - beam5.transient_gb * 2.0).abs() < 1e-9);
    }

    #[test]
    fn can_accept_is_monotonic_in_loaded_status() {
        let rm = ResourceManager::default();
        let est = rm.estimate("large", "float32", 5.0, 5);
        let snap = cpu_snapshot(est.resident_gb + est.transient_gb + CPU_RAM_MARGIN_GB - 0.5);
        let (cold_ok, _) = rm.can_accept(Device::Cpu, est, false, &snap);
        let (warm_ok, _) = rm.can_accept(Device::Cpu, est, true, &snap);
        assert!(!cold_ok);
        assert!(warm_ok);
    }

    #[test]
    fn rejection_boundary_is_strict_inequality() {
        let rm = ResourceManager::default();
        let est = Estimate {
            resident_gb: 1.0,
            transient_gb: 1.0,
        };
        let snap = cpu_snapshot(2.0 + CPU_RAM_MARGIN_GB);
        let (ok_at_boundary, _) = rm.can_accept(Device::Cpu, est, false, &snap);
        assert!(ok_at_boundary, "need == free should be accepted");

        let snap_short = cpu_snapshot(2.0 + CPU_RAM_MARGIN_GB - 0.01);
        let (ok_below, _) = rm.can_accept(Device::Cpu, est, false, &snap_short);
        assert!(!ok_below);
    }

    #[test]
    fn cuda_requires_gpu_presence() {
        let rm = ResourceManager::default();
        let est = rm.estimate("base", "float16", 1.0, 5);
        let snap = cpu_snapshot(32.0);
        let (ok, reason) = rm.can_accept(Device::Cuda, est, false, &snap);
        assert!(!ok);
        assert!(reason.unwrap().contains("GPU"));
    }

    #[test]
    fn concurrency_hint_at_least_one_when_device_available() {
        let rm = ResourceManager::default();
        let est = rm.estimate("tiny", "int8", 1.0, 5);
        let snap = cpu_snapshot(64.0);
        assert!(rm.concurrency_hint(Device::Cpu, est, &snap) >= 1);
        let gpu_snap = gpu_snapshot(16.0);
        assert!(rm.concurrency_hint(Device::Cuda, est, &gpu_snap) >= 1);
    }

    #[test]
    fn concurrency_hint_zero_when_gpu_absent() {
        let rm = ResourceManager::default();
        let est = rm.estimate("tiny", "int8", 1.0, 5);
        let snap = cpu_snapshot(64.0);
        assert_eq!(rm.concurrency_hint(Device::Cuda, est, &snap), 0);
    }

    #[tokio::test]
    async fn admit_or_fail_rejects_insufficient_ram() {
        let rm = ResourceManager::default();
        // Can't control the live probe, so exercise can_accept-driven logic
        // through a hand-built snapshot via the same formulas admit_or_fail uses.
        let est = rm.estimate("large", "float32", 5.0, 5);
        let snap = cpu_snapshot(1.0);
        let (ok, reason) = rm.can_accept(Device::Cpu, est, false, &snap);
        assert!(!ok);
        assert!(reason.unwrap().contains("RAM"));
    }
}
