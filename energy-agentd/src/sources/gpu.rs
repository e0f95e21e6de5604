//! GPU accelerator energy source (§4.B, §6): reads instantaneous device
//! power via NVML and converts to an absolute mJ-since-process-start
//! counter by accumulating `power_mw * sample_period_ms / 1000` each
//! tick, matching the "instantaneous power, converted to mJ by
//! multiplying by SamplePeriodSec" contract.
//!
//! Vendor SDK bindings are an out-of-scope collaborator (§1); this module
//! is the thin adapter the core's `EnergySource` trait expects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use energy_core::energy_source::{EnergyReading, EnergySource};
use energy_core::error::SourceError;

#[cfg(feature = "gpu")]
use gfxinfo::active_gpu;

#[derive(Debug, Clone, serde::Serialize)]
pub struct GpuUtilization {
    pub name: String,
    pub utilization_gpu_pct: u32,
    pub mem_used_bytes: u64,
    pub mem_total_bytes: u64,
}

/// Vendor-agnostic utilization probe, used to feed the `gpu_compute_util`
/// / `gpu_mem_util` resource metrics. Independent of the energy reading
/// above — utilization is a resource observation, not an energy one.
#[cfg(feature = "gpu")]
pub fn collect_gpu_utilization() -> Result<Vec<GpuUtilization>, Box<dyn std::error::Error>> {
    let gpu = active_gpu()?;
    let info = gpu.info();
    Ok(vec![GpuUtilization {
        name: gpu.model().to_string(),
        utilization_gpu_pct: info.load_pct() as u32,
        mem_used_bytes: info.used_vram(),
        mem_total_bytes: info.total_vram(),
    }])
}

#[cfg(not(feature = "gpu"))]
pub fn collect_gpu_utilization() -> Result<Vec<GpuUtilization>, Box<dyn std::error::Error>> {
    Ok(Vec::new())
}

pub struct GpuSource {
    sample_period_sec: u64,
    supported: AtomicBool,
    cumulative_mj: AtomicU64,
    #[cfg(feature = "gpu")]
    nvml: Option<nvml_wrapper::Nvml>,
}

impl GpuSource {
    pub fn new(sample_period_sec: u64) -> Self {
        #[cfg(feature = "gpu")]
        let nvml = nvml_wrapper::Nvml::init().ok();
        #[cfg(feature = "gpu")]
        let supported = nvml.is_some();
        #[cfg(not(feature = "gpu"))]
        let supported = false;

        Self {
            sample_period_sec,
            supported: AtomicBool::new(supported),
            cumulative_mj: AtomicU64::new(0),
            #[cfg(feature = "gpu")]
            nvml,
        }
    }

    #[cfg(feature = "gpu")]
    fn read_power_mw(&self) -> Result<u32, SourceError> {
        let nvml = self.nvml.as_ref().ok_or_else(|| SourceError::Unsupported {
            name: self.name().to_string(),
        })?;
        let device = nvml.device_by_index(0).map_err(|e| SourceError::Io {
            name: self.name().to_string(),
            message: e.to_string(),
        })?;
        device.power_usage().map_err(|e| SourceError::Io {
            name: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

impl EnergySource for GpuSource {
    fn name(&self) -> &str {
        "gpu"
    }

    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::Relaxed)
    }

    #[cfg(feature = "gpu")]
    fn read(&self) -> Result<EnergyReading, SourceError> {
        let power_mw = self.read_power_mw()?;
        let mj_this_tick = (power_mw as u64) * self.sample_period_sec;
        let cumulative = self.cumulative_mj.fetch_add(mj_this_tick, Ordering::Relaxed) + mj_this_tick;
        let mut out = HashMap::new();
        out.insert("gpu:0".to_string(), cumulative);
        Ok(out)
    }

    #[cfg(not(feature = "gpu"))]
    fn read(&self) -> Result<EnergyReading, SourceError> {
        Err(SourceError::Unsupported { name: self.name().to_string() })
    }

    fn stop(&self) {
        self.supported.store(false, Ordering::Relaxed);
    }
}
