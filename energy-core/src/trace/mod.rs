//! Kernel trace aggregator (§4.C): byte-exact decoding of the kernel
//! producer's ring-buffer records, plus the per-(CPU,task) counter
//! roll-up that folds them into per-PID totals.

pub mod aggregator;
pub mod events;

pub use aggregator::{Aggregator, CollectedProcesses, ProcessCounters};
pub use events::{decode_all, decode_one, RawEvent};

/// Which optional probes are attached (§4.C attachment-failure model).
/// `sched_switch` is always true once startup succeeds (its failure is
/// fatal and aborts startup, so a live `ProbeSet` never reports it false).
/// An unattached optional probe removes its metric names from the
/// exported capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSet {
    pub sched_switch: bool,
    pub irq: bool,
    pub page_cache: bool,
    pub hw_counters: bool,
}

impl ProbeSet {
    pub fn fully_attached() -> Self {
        Self { sched_switch: true, irq: true, page_cache: true, hw_counters: true }
    }
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self::fully_attached()
    }
}

/// Collaborator: produces raw byte batches from the kernel ring buffer.
/// The actual eBPF attach/poll is out of scope; `energy-agentd` supplies
/// the concrete implementation (or a `NullEventSource` when attachment
/// failed and the probe was non-fatal).
pub trait KernelEventSource: Send {
    fn next_batch(&mut self) -> Vec<u8>;
}

