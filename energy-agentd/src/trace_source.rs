//! Kernel event source collaborators (§4.C, §6). Attaching the actual
//! eBPF probes (scheduler context-switch, IRQ entry, page-cache hit,
//! process-free) is out of scope for this crate's core logic — it is a
//! build-and-target-specific concern handled by whatever eBPF loader the
//! deployment uses. What lives here is the consumption side: a channel
//! that hands raw byte batches to the aggregator, plus the fallback used
//! when a non-mandatory probe fails to attach.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use energy_core::trace::KernelEventSource;

/// Used when an optional probe failed to attach (§4.C: failures are
/// non-fatal except for scheduler context-switch). Always returns empty
/// batches so the aggregator simply sees no events for that class.
pub struct NullEventSource;

impl KernelEventSource for NullEventSource {
    fn next_batch(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

/// Bridges a blocking kernel-buffer-reader thread (single-producer) into
/// the aggregator's single-consumer ingestion loop via a bounded channel,
/// matching §5's "single-producer from the kernel buffer" ordering rule.
pub struct ChannelEventSource {
    rx: Receiver<Vec<u8>>,
    poll_timeout: Duration,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<Vec<u8>>, poll_timeout: Duration) -> Self {
        Self { rx, poll_timeout }
    }
}

impl KernelEventSource for ChannelEventSource {
    fn next_batch(&mut self) -> Vec<u8> {
        match self.rx.recv_timeout(self.poll_timeout) {
            Ok(batch) => batch,
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    }
}
