//! User-space per-(CPU,task) counter aggregator (§4.C). Folds on-CPU /
//! off-CPU transitions, IRQ entries, and page-cache hits into a per-PID
//! roll-up, protected by a single mutex shared between ingestion and
//! collection.

use std::collections::HashMap;
use std::sync::Mutex;

use super::events::{RawEvent, IRQ_BLOCK, IRQ_NET_RX, IRQ_NET_TX};

#[derive(Debug, Clone, Copy, Default)]
struct PerCpuCounters {
    cpu_cycles: u64,
    cpu_instructions: u64,
    cache_misses: u64,
    timestamp_ns: u64,
}

#[derive(Debug, Clone, Default)]
struct ProcessTotals {
    cgroup_id: u64,
    process_runtime_ns: u64,
    cpu_cycles: u64,
    cpu_instructions: u64,
    cache_miss: u64,
    page_cache_hit: u64,
    irq_net_tx: u64,
    irq_net_rx: u64,
    irq_block: u64,
}

/// One process's counter deltas since the last `collect_processes` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessCounters {
    pub pid: u32,
    pub cgroup_id: u64,
    pub process_runtime_ms: u64,
    pub cpu_cycles: u64,
    pub cpu_instructions: u64,
    pub cache_miss: u64,
    pub page_cache_hit: u64,
    pub irq_net_tx: u64,
    pub irq_net_rx: u64,
    pub irq_block: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedProcesses {
    pub metrics: Vec<ProcessCounters>,
    pub freed_pids: Vec<u32>,
}

#[derive(Default)]
struct Inner {
    /// `(cpu, tid) -> start counters`, in-flight on-CPU tasks.
    start: HashMap<(u32, u32), PerCpuCounters>,
    totals: HashMap<u32, ProcessTotals>,
    freed_pids: Vec<u32>,
}

/// Single mutex guarding the per-PID map and freed-pid list. Event
/// ingestion and `collect_processes` are mutually exclusive; the lock is
/// held only for the duration of folding a single event or draining a
/// snapshot, never across I/O.
pub struct Aggregator {
    inner: Mutex<Inner>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Fold one decoded kernel record into the running totals. Reordered
    /// or unmatched off-CPU events (no prior on-CPU start, or an off
    /// timestamp/counter value that precedes the recorded start) are
    /// dropped as a known clock-skew edge case (§4.C, §7 kind 4).
    pub fn ingest(&self, event: RawEvent) {
        let mut inner = self.inner.lock().unwrap();
        match event {
            RawEvent::SchedSwitch {
                cpu_id,
                on_tid,
                off_tid,
                off_pid,
                off_cgroup_id,
                timestamp_ns,
                cpu_cycles,
                cpu_instructions,
                cache_misses,
                ..
            } => {
                // Record the on-CPU start. Overwriting an existing start
                // for the same (cpu,tid) is tolerated: last writer wins.
                inner.start.insert(
                    (cpu_id, on_tid),
                    PerCpuCounters {
                        cpu_cycles,
                        cpu_instructions,
                        cache_misses,
                        timestamp_ns,
                    },
                );

                if let Some(start) = inner.start.remove(&(cpu_id, off_tid)) {
                    if timestamp_ns >= start.timestamp_ns
                        && cpu_cycles >= start.cpu_cycles
                        && cpu_instructions >= start.cpu_instructions
                        && cache_misses >= start.cache_misses
                    {
                        let totals = inner.totals.entry(off_pid).or_default();
                        totals.cgroup_id = off_cgroup_id;
                        totals.process_runtime_ns += timestamp_ns - start.timestamp_ns;
                        totals.cpu_cycles += cpu_cycles - start.cpu_cycles;
                        totals.cpu_instructions += cpu_instructions - start.cpu_instructions;
                        totals.cache_miss += cache_misses - start.cache_misses;
                    }
                    // else: clock skew between on/off events, discard.
                }
            }
            RawEvent::Irq { pid, irq_number } => {
                let totals = inner.totals.entry(pid).or_default();
                match irq_number {
                    IRQ_NET_TX => totals.irq_net_tx += 1,
                    IRQ_NET_RX => totals.irq_net_rx += 1,
                    IRQ_BLOCK => totals.irq_block += 1,
                    _ => {}
                }
            }
            RawEvent::PageCacheHit { pid } => {
                inner.totals.entry(pid).or_default().page_cache_hit += 1;
            }
            RawEvent::Free { pid } => {
                inner.freed_pids.push(pid);
            }
        }
    }

    /// Drain the running totals into a snapshot. After collection: totals
    /// are zeroed (they accumulate until drained); in-flight `start`
    /// entries are preserved (they belong to currently on-CPU tasks);
    /// the freed-pid list is cleared.
    pub fn collect_processes(&self) -> CollectedProcesses {
        let mut inner = self.inner.lock().unwrap();
        let totals = std::mem::take(&mut inner.totals);
        let freed_pids = std::mem::take(&mut inner.freed_pids);

        let metrics = totals
            .into_iter()
            .map(|(pid, t)| ProcessCounters {
                pid,
                cgroup_id: t.cgroup_id,
                process_runtime_ms: t.process_runtime_ns / 1_000_000,
                cpu_cycles: t.cpu_cycles,
                cpu_instructions: t.cpu_instructions,
                cache_miss: t.cache_miss,
                page_cache_hit: t.page_cache_hit,
                irq_net_tx: t.irq_net_tx,
                irq_net_rx: t.irq_net_rx,
                irq_block: t.irq_block,
            })
            .collect();

        CollectedProcesses { metrics, freed_pids }
    }

    #[cfg(test)]
    fn in_flight_starts(&self) -> usize {
        self.inner.lock().unwrap().start.len()
    }
}
