//! Sampling manager (§4.G): orchestrates one tick end-to-end. Ticks are
//! serialized; there is at most one outstanding tick. Scrape reads are
//! synchronized with ticks by the same mutex the caller wraps this
//! manager in (§5) — the manager itself just needs `&mut self` per tick.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ManagerConfig;
use crate::energy_source::{EnergySource, SourceReadOutcome};
use crate::entities::{
    rebuild_rollups, rollup_node, ContainerStats, NodeStats, ProcessStats, VMStats, KERNEL_PID,
    KERNEL_PROCESS_NAME,
};
use crate::metric_name::{EnergyDomain, EnergyMode, ResourceMetric};
use crate::power_model::apply_ratio_model;
use crate::resolution::{resolve_container, resolve_vm, CgroupResolver, VmResolver};
use crate::stats::{StatCollection, GENERIC_SOURCE};
use crate::trace::Aggregator;

/// Metric-name -> energy domain, used to fold an `EnergySource`'s source
/// ids into the right node energy bucket. Sources are expected to key
/// their `EnergyReading` by `"<domain>:<source_id>"` so the manager can
/// route readings without a fixed schema per vendor (§4.B, §6).
fn domain_of_source_key(key: &str) -> Option<(EnergyDomain, &str)> {
    let (domain_str, source_id) = key.split_once(':')?;
    let domain = match domain_str {
        "pkg" => EnergyDomain::Pkg,
        "core" => EnergyDomain::Core,
        "uncore" => EnergyDomain::Uncore,
        "dram" => EnergyDomain::Dram,
        "gpu" => EnergyDomain::Gpu,
        "platform" => EnergyDomain::Platform,
        "other" => EnergyDomain::Other,
        _ => return None,
    };
    Some((domain, source_id))
}

/// Per-tick degradation notices the caller should log; never fatal.
#[derive(Debug, Default)]
pub struct TickReport {
    pub failed_sources: Vec<String>,
    pub resolve_fallbacks: u32,
}

pub struct SamplingManager {
    config: ManagerConfig,
    aggregator: Arc<Aggregator>,
    energy_sources: Vec<Arc<dyn EnergySource>>,
    cgroup_resolver: Arc<dyn CgroupResolver>,
    vm_resolver: Arc<dyn VmResolver>,

    processes: HashMap<u32, ProcessStats>,
    containers: HashMap<String, ContainerStats>,
    vms: HashMap<String, VMStats>,
    node: NodeStats,

    /// Per-domain, per-source absolute-energy baselines (§4.B's
    /// cumulative-since-start counters). Kept outside `node.usage` so
    /// `rollup_node`'s per-tick rebuild of `Absolute` readings never wipes
    /// the aggregate `set_aggr` needs to compute next tick's delta.
    source_baselines: HashMap<EnergyDomain, StatCollection>,

    /// PIDs reported freed last tick; removed after one further tick's
    /// grace so the final delta is still visible to that tick's scrape.
    pending_removal: Vec<u32>,
}

impl SamplingManager {
    pub fn new(
        config: ManagerConfig,
        aggregator: Arc<Aggregator>,
        energy_sources: Vec<Arc<dyn EnergySource>>,
        cgroup_resolver: Arc<dyn CgroupResolver>,
        vm_resolver: Arc<dyn VmResolver>,
    ) -> Self {
        let node = NodeStats::new(config.estimator.history_size);
        Self {
            config,
            aggregator,
            energy_sources,
            cgroup_resolver,
            vm_resolver,
            processes: HashMap::new(),
            containers: HashMap::new(),
            vms: HashMap::new(),
            node,
            source_baselines: HashMap::new(),
            pending_removal: Vec::new(),
        }
    }

    /// Sources this manager was constructed with, for the caller to read
    /// (concurrently, outside any lock on this manager) each tick and to
    /// `stop()` at shutdown.
    pub fn energy_sources(&self) -> &[Arc<dyn EnergySource>] {
        &self.energy_sources
    }

    pub fn processes(&self) -> &HashMap<u32, ProcessStats> {
        &self.processes
    }

    pub fn containers(&self) -> &HashMap<String, ContainerStats> {
        &self.containers
    }

    pub fn vms(&self) -> &HashMap<String, VMStats> {
        &self.vms
    }

    pub fn node(&self) -> &NodeStats {
        &self.node
    }

    /// Run one tick of §4.G's ten steps. `source_outcomes` is this tick's
    /// already-collected energy-source reads (concurrent fan-out happens
    /// before the caller takes whatever lock guards this manager, so the
    /// lock is never held across an `.await`).
    pub fn tick(&mut self, source_outcomes: Vec<SourceReadOutcome>) -> TickReport {
        let mut report = TickReport::default();

        // 0. PIDs freed last tick get their one-sample grace removed now,
        //    *before* inserting this tick's data (step 4).
        for pid in self.pending_removal.drain(..).collect::<Vec<_>>() {
            self.processes.remove(&pid);
        }

        // 1. Fold this tick's node absolute energy snapshot. Baselines
        //    live outside `node.usage` (step 6 rebuilds that every tick)
        //    so `set_aggr` always sees last tick's aggregate.
        let mut node_abs_energy_delta: HashMap<EnergyDomain, u64> = HashMap::new();
        for outcome in source_outcomes {
            match outcome.result {
                Ok(reading) => {
                    for (key, mj) in reading {
                        if let Some((domain, source_id)) = domain_of_source_key(&key) {
                            let baseline = self.source_baselines.entry(domain).or_default();
                            baseline.set_aggr(source_id, mj);
                            *node_abs_energy_delta.entry(domain).or_default() +=
                                baseline.get(source_id).delta();
                        } else {
                            debug!(source = %outcome.name, key = %key, "unrecognized source key, skipping");
                        }
                    }
                }
                Err(e) => {
                    warn!(source = %outcome.name, error = %e, "energy source read failed this tick");
                    report.failed_sources.push(outcome.name);
                }
            }
        }

        // 2. Collect trace aggregator output.
        let collected = self.aggregator.collect_processes();

        // 3 + 4. Resolve (container_id, vm_id) and insert/update process entities.
        for pc in &collected.metrics {
            let (pid, container_id, vm_id, command) = if pc.cgroup_id == 1 {
                (
                    KERNEL_PID,
                    crate::entities::SYSTEM_CONTAINER_ID.to_string(),
                    String::new(),
                    KERNEL_PROCESS_NAME.to_string(),
                )
            } else {
                let container_id = resolve_container(self.cgroup_resolver.as_ref(), pc.pid, pc.cgroup_id);
                let vm_id = resolve_vm(self.vm_resolver.as_ref(), pc.pid);
                if container_id == crate::entities::SYSTEM_CONTAINER_ID {
                    report.resolve_fallbacks += 1;
                }
                (pc.pid, container_id, vm_id, pc.pid.to_string())
            };

            let entry = self
                .processes
                .entry(pid)
                .or_insert_with(|| ProcessStats::new(pid, command.clone()));
            entry.cgroup_id = pc.cgroup_id;
            entry.container_id = container_id;
            entry.vm_id = vm_id;
            entry.mark_observed();

            entry
                .usage
                .resource(ResourceMetric::CpuTime)
                .add_delta(GENERIC_SOURCE, pc.process_runtime_ms);
            entry
                .usage
                .resource(ResourceMetric::CpuCycles)
                .add_delta(GENERIC_SOURCE, pc.cpu_cycles);
            entry
                .usage
                .resource(ResourceMetric::CpuInstructions)
                .add_delta(GENERIC_SOURCE, pc.cpu_instructions);
            entry
                .usage
                .resource(ResourceMetric::CacheMiss)
                .add_delta(GENERIC_SOURCE, pc.cache_miss);
            entry
                .usage
                .resource(ResourceMetric::PageCacheHit)
                .add_delta(GENERIC_SOURCE, pc.page_cache_hit);
            entry
                .usage
                .resource(ResourceMetric::IrqNetTx)
                .add_delta(GENERIC_SOURCE, pc.irq_net_tx);
            entry
                .usage
                .resource(ResourceMetric::IrqNetRx)
                .add_delta(GENERIC_SOURCE, pc.irq_net_rx);
            entry
                .usage
                .resource(ResourceMetric::IrqBlock)
                .add_delta(GENERIC_SOURCE, pc.irq_block);
        }

        // Processes with no new observation this tick age toward cleanup.
        for (pid, p) in self.processes.iter_mut() {
            if !collected.metrics.iter().any(|pc| resolved_pid(pc) == *pid) {
                p.tick_idle();
            }
        }
        self.processes.retain(|_, p| !p.should_cleanup(self.config.cleanup_threshold));

        // Freed PIDs are removed after one further tick's grace (step 4).
        self.pending_removal.extend(collected.freed_pids);

        // 5. Rebuild container and VM rollups.
        let (containers, vms) = rebuild_rollups(&self.processes);
        self.containers = containers;
        self.vms = vms;

        // 6. Update node resource and energy usage.
        rollup_node(&mut self.node, &self.processes);
        for (domain, delta) in &node_abs_energy_delta {
            self.node.usage.energy(*domain, EnergyMode::Absolute).set_delta(GENERIC_SOURCE, *delta);
        }

        // 7. Update each node IdleEnergyState with the (resource, energy)
        //    pair, gated on whether idle-power estimation is enabled (§6).
        if self.config.estimate_idle_power {
            let max_theoretical = self.config.max_theoretical_cpu_time_ms();
            for domain in EnergyDomain::ALL {
                let resource = domain.paired_resource();
                let x = self
                    .node
                    .usage
                    .resource_get(resource)
                    .map(|c| c.sum_all_delta())
                    .unwrap_or(0) as f64;
                let y = *node_abs_energy_delta.get(&domain).unwrap_or(&0) as f64;
                if let Some(state) = self.node.idle_states.get_mut(&domain) {
                    state.update(x, y, &self.config.estimator, max_theoretical);
                }
            }
        }

        // 8. Compute dynamic = max(0, abs - idle); "other" from residual.
        let mut node_dynamic_energy_mj: HashMap<EnergyDomain, u64> = HashMap::new();
        for domain in EnergyDomain::ALL {
            if domain == EnergyDomain::Other {
                continue; // computed below from the residual.
            }
            let abs = *node_abs_energy_delta.get(&domain).unwrap_or(&0) as f64;
            let idle = self
                .node
                .idle_states
                .get(&domain)
                .map(|s| s.calculated_idle_energy())
                .unwrap_or(0.0);
            let dynamic = (abs - idle).max(0.0);
            node_dynamic_energy_mj.insert(domain, dynamic.round() as u64);
            self.node
                .usage
                .energy(domain, EnergyMode::Idle)
                .set_delta(GENERIC_SOURCE, idle.max(0.0).round() as u64);
            self.node
                .usage
                .energy(domain, EnergyMode::Dynamic)
                .set_delta(GENERIC_SOURCE, dynamic.round() as u64);
        }

        let platform_dyn = node_dynamic_energy_mj.get(&EnergyDomain::Platform).copied().unwrap_or(0) as i64;
        let pkg_dyn = node_dynamic_energy_mj.get(&EnergyDomain::Pkg).copied().unwrap_or(0) as i64;
        let dram_dyn = node_dynamic_energy_mj.get(&EnergyDomain::Dram).copied().unwrap_or(0) as i64;
        let gpu_dyn = node_dynamic_energy_mj.get(&EnergyDomain::Gpu).copied().unwrap_or(0) as i64;
        let other_dyn = (platform_dyn - (pkg_dyn + dram_dyn + gpu_dyn)).max(0) as u64;
        node_dynamic_energy_mj.insert(EnergyDomain::Other, other_dyn);
        self.node.usage.energy(EnergyDomain::Other, EnergyMode::Dynamic).set_delta(GENERIC_SOURCE, other_dyn);

        let platform_idle = self.node.idle_states.get(&EnergyDomain::Platform).map(|s| s.calculated_idle_energy()).unwrap_or(0.0);
        let pkg_idle = self.node.idle_states.get(&EnergyDomain::Pkg).map(|s| s.calculated_idle_energy()).unwrap_or(0.0);
        let dram_idle = self.node.idle_states.get(&EnergyDomain::Dram).map(|s| s.calculated_idle_energy()).unwrap_or(0.0);
        let gpu_idle = self.node.idle_states.get(&EnergyDomain::Gpu).map(|s| s.calculated_idle_energy()).unwrap_or(0.0);
        let other_idle = (platform_idle - (pkg_idle + dram_idle + gpu_idle)).max(0.0);
        self.node.usage.energy(EnergyDomain::Other, EnergyMode::Idle).set_delta(GENERIC_SOURCE, other_idle.round() as u64);

        // 9. Run the ratio model to populate per-process energy_usage.
        apply_ratio_model(&mut self.processes, &node_dynamic_energy_mj, |usage, metric| {
            usage.resource_get(metric).map(|c| c.sum_all_delta()).unwrap_or(0)
        });

        // Re-roll containers/VMs now that processes carry dynamic energy shares.
        let (containers, vms) = rebuild_rollups(&self.processes);
        self.containers = containers;
        self.vms = vms;

        // 10. ResetDelta on all entities (idle energy preserved).
        for p in self.processes.values_mut() {
            p.usage.reset_delta();
        }
        for c in self.containers.values_mut() {
            c.usage.reset_delta();
        }
        for v in self.vms.values_mut() {
            v.usage.reset_delta();
        }
        self.node.usage.reset_delta();

        report
    }
}

fn resolved_pid(pc: &crate::trace::ProcessCounters) -> u32 {
    if pc.cgroup_id == 1 {
        KERNEL_PID
    } else {
        pc.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResolveError, SourceError};
    use std::collections::HashMap as Map;

    struct SystemFallbackResolver;
    impl CgroupResolver for SystemFallbackResolver {
        fn cgroup_to_container(&self, pid: u32, _cgroup_id: u64) -> Result<String, ResolveError> {
            Err(ResolveError::NoCgroupMapping(pid))
        }
    }
    impl VmResolver for SystemFallbackResolver {
        fn pid_to_vm(&self, pid: u32) -> Result<String, ResolveError> {
            Err(ResolveError::NoVmMapping(pid))
        }
    }

    fn cfg() -> ManagerConfig {
        ManagerConfig {
            sample_period_sec: 1,
            cleanup_threshold: 2,
            cpu_count: 1,
            source_read_timeout_ms: 500,
            estimate_idle_power: true,
            estimator: crate::config::EstimatorConfig {
                min_spread: 0.0,
                min_intercept: f64::NEG_INFINITY,
                min_slope: f64::NEG_INFINITY,
                history_size: 3,
            },
        }
    }

    #[test]
    fn tick_inserts_process_from_aggregator_output() {
        let aggregator = Arc::new(Aggregator::new());
        aggregator.ingest(crate::trace::RawEvent::SchedSwitch {
            cpu_id: 0,
            on_tid: 5,
            on_pid: 5,
            off_tid: 1,
            off_pid: 0,
            off_cgroup_id: 99,
            timestamp_ns: 0,
            cpu_cycles: 0,
            cpu_instructions: 0,
            cache_misses: 0,
        });
        aggregator.ingest(crate::trace::RawEvent::SchedSwitch {
            cpu_id: 0,
            on_tid: 1,
            on_pid: 1,
            off_tid: 5,
            off_pid: 77,
            off_cgroup_id: 99,
            timestamp_ns: 3_000_000,
            cpu_cycles: 500,
            cpu_instructions: 1000,
            cache_misses: 10,
        });

        let mut mgr = SamplingManager::new(
            cfg(),
            aggregator,
            vec![],
            Arc::new(SystemFallbackResolver),
            Arc::new(SystemFallbackResolver),
        );
        mgr.tick(vec![]);
        assert!(mgr.processes().contains_key(&77));
        let p = &mgr.processes()[&77];
        assert_eq!(p.container_id, "system");
    }

    #[test]
    fn freed_pid_removed_after_one_tick_grace() {
        let aggregator = Arc::new(Aggregator::new());
        aggregator.ingest(crate::trace::RawEvent::Free { pid: 5 });
        let mut mgr = SamplingManager::new(
            cfg(),
            aggregator.clone(),
            vec![],
            Arc::new(SystemFallbackResolver),
            Arc::new(SystemFallbackResolver),
        );
        mgr.processes.insert(5, ProcessStats::new(5, "victim"));
        mgr.tick(vec![]); // freed_pids recorded, process still present this tick
        assert!(mgr.processes().contains_key(&5));
        mgr.tick(vec![]); // grace elapsed, now removed
        assert!(!mgr.processes().contains_key(&5));
    }

    #[test]
    fn failed_energy_source_is_reported_not_fatal() {
        let aggregator = Arc::new(Aggregator::new());
        let mut mgr = SamplingManager::new(
            cfg(),
            aggregator,
            vec![],
            Arc::new(SystemFallbackResolver),
            Arc::new(SystemFallbackResolver),
        );
        let outcomes = vec![SourceReadOutcome {
            name: "platform".to_string(),
            result: Err(SourceError::Io { name: "platform".into(), message: "nope".into() }),
        }];
        let report = mgr.tick(outcomes);
        assert_eq!(report.failed_sources, vec!["platform".to_string()]);
    }

    /// Regression test for the per-source absolute-energy baseline: a
    /// monotonically increasing cumulative reading must yield this tick's
    /// increment, not the full cumulative value, from the second tick on.
    #[test]
    fn absolute_energy_baseline_survives_rollup_across_ticks() {
        let aggregator = Arc::new(Aggregator::new());
        let mut mgr = SamplingManager::new(
            cfg(),
            aggregator,
            vec![],
            Arc::new(SystemFallbackResolver),
            Arc::new(SystemFallbackResolver),
        );

        let reading = |mj: u64| {
            let mut m = Map::new();
            m.insert("pkg:socket0".to_string(), mj);
            vec![SourceReadOutcome { name: "pkg".to_string(), result: Ok(m) }]
        };

        mgr.tick(reading(1_000));
        assert_eq!(
            mgr.node().usage.energy_get(EnergyDomain::Pkg, EnergyMode::Absolute).map(|c| c.sum_all_delta()),
            Some(1_000)
        );

        // If the baseline were wiped by the rollup, this tick's delta would
        // be the full 2_500 cumulative reading instead of the 1_500 increment.
        mgr.tick(reading(2_500));
        assert_eq!(
            mgr.node().usage.energy_get(EnergyDomain::Pkg, EnergyMode::Absolute).map(|c| c.sum_all_delta()),
            Some(1_500)
        );

        mgr.tick(reading(2_600));
        assert_eq!(
            mgr.node().usage.energy_get(EnergyDomain::Pkg, EnergyMode::Absolute).map(|c| c.sum_all_delta()),
            Some(100)
        );
    }
}
