//! The closed set of metric names the model understands (§3).

use std::fmt;

/// The seven energy "domains" shared by absolute, idle, and dynamic energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnergyDomain {
    Pkg,
    Core,
    Uncore,
    Dram,
    Gpu,
    Other,
    Platform,
}

impl EnergyDomain {
    pub const ALL: [EnergyDomain; 7] = [
        EnergyDomain::Pkg,
        EnergyDomain::Core,
        EnergyDomain::Uncore,
        EnergyDomain::Dram,
        EnergyDomain::Gpu,
        EnergyDomain::Other,
        EnergyDomain::Platform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyDomain::Pkg => "pkg",
            EnergyDomain::Core => "core",
            EnergyDomain::Uncore => "uncore",
            EnergyDomain::Dram => "dram",
            EnergyDomain::Gpu => "gpu",
            EnergyDomain::Other => "other",
            EnergyDomain::Platform => "platform",
        }
    }

    /// The resource metric paired with this energy domain by the ratio
    /// power model (§4.F).
    pub fn paired_resource(&self) -> ResourceMetric {
        match self {
            EnergyDomain::Pkg | EnergyDomain::Core | EnergyDomain::Uncore | EnergyDomain::Dram => {
                ResourceMetric::CpuTime
            }
            EnergyDomain::Gpu => ResourceMetric::GpuComputeUtil,
            EnergyDomain::Platform => ResourceMetric::CpuTime,
            EnergyDomain::Other => ResourceMetric::CpuTime,
        }
    }
}

impl fmt::Display for EnergyDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode an energy metric is reported under (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnergyMode {
    Absolute,
    Idle,
    Dynamic,
}

impl EnergyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyMode::Absolute => "absolute",
            EnergyMode::Idle => "idle",
            EnergyMode::Dynamic => "dynamic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceMetric {
    CpuTime,
    CpuCycles,
    CpuInstructions,
    CacheMiss,
    PageCacheHit,
    TaskClock,
    IrqNetTx,
    IrqNetRx,
    IrqBlock,
    GpuComputeUtil,
    GpuMemUtil,
    QatUtil,
    CpuFrequency,
}

impl ResourceMetric {
    pub const ALL: [ResourceMetric; 13] = [
        ResourceMetric::CpuTime,
        ResourceMetric::CpuCycles,
        ResourceMetric::CpuInstructions,
        ResourceMetric::CacheMiss,
        ResourceMetric::PageCacheHit,
        ResourceMetric::TaskClock,
        ResourceMetric::IrqNetTx,
        ResourceMetric::IrqNetRx,
        ResourceMetric::IrqBlock,
        ResourceMetric::GpuComputeUtil,
        ResourceMetric::GpuMemUtil,
        ResourceMetric::QatUtil,
        ResourceMetric::CpuFrequency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceMetric::CpuTime => "cpu_time",
            ResourceMetric::CpuCycles => "cpu_cycles",
            ResourceMetric::CpuInstructions => "cpu_instructions",
            ResourceMetric::CacheMiss => "cache_miss",
            ResourceMetric::PageCacheHit => "page_cache_hit",
            ResourceMetric::TaskClock => "task_clock",
            ResourceMetric::IrqNetTx => "irq_net_tx",
            ResourceMetric::IrqNetRx => "irq_net_rx",
            ResourceMetric::IrqBlock => "irq_block",
            ResourceMetric::GpuComputeUtil => "gpu_compute_util",
            ResourceMetric::GpuMemUtil => "gpu_mem_util",
            ResourceMetric::QatUtil => "qat_util",
            ResourceMetric::CpuFrequency => "cpu_frequency",
        }
    }
}

impl fmt::Display for ResourceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
