//! Process/container/VM/node stats (§3, §4.D): per-entity energy and
//! resource usage containers, and the rollup from process to
//! container/VM to node.

use std::collections::{HashMap, HashSet};

use crate::idle::IdleEnergyState;
use crate::metric_name::{EnergyDomain, EnergyMode, ResourceMetric};
use crate::stats::StatCollection;

/// Synthetic container id processes fall back to when cgroup/VM
/// resolution fails (§6).
pub const SYSTEM_CONTAINER_ID: &str = "system";

/// Kernel threads (cgroup_id == 1) are folded into one synthetic process
/// (§4.D).
pub const KERNEL_PID: u32 = 1;
pub const KERNEL_PROCESS_NAME: &str = "kernel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnergyKey {
    pub domain: EnergyDomain,
    pub mode: EnergyMode,
}

impl EnergyKey {
    pub fn new(domain: EnergyDomain, mode: EnergyMode) -> Self {
        Self { domain, mode }
    }
}

/// Common energy+resource usage table shared by every entity kind.
#[derive(Debug, Clone, Default)]
pub struct UsageTables {
    pub resource_usage: HashMap<ResourceMetric, StatCollection>,
    pub energy_usage: HashMap<EnergyKey, StatCollection>,
}

impl UsageTables {
    pub fn resource(&mut self, m: ResourceMetric) -> &mut StatCollection {
        self.resource_usage.entry(m).or_default()
    }

    pub fn energy(&mut self, domain: EnergyDomain, mode: EnergyMode) -> &mut StatCollection {
        self.energy_usage.entry(EnergyKey::new(domain, mode)).or_default()
    }

    pub fn resource_get(&self, m: ResourceMetric) -> Option<&StatCollection> {
        self.resource_usage.get(&m)
    }

    pub fn energy_get(&self, domain: EnergyDomain, mode: EnergyMode) -> Option<&StatCollection> {
        self.energy_usage.get(&EnergyKey::new(domain, mode))
    }

    /// Called at the end of each tick. Idle energy deltas are preserved
    /// (§4.D: they represent the current idle baseline, not a sample);
    /// every other resource/energy metric's delta is zeroed.
    pub fn reset_delta(&mut self) {
        for c in self.resource_usage.values_mut() {
            c.reset_delta();
        }
        for (key, c) in self.energy_usage.iter_mut() {
            if key.mode != EnergyMode::Idle {
                c.reset_delta();
            }
        }
    }

    fn add_from(&mut self, other: &UsageTables) {
        for (metric, coll) in &other.resource_usage {
            let dst = self.resource(*metric);
            for (source_id, v) in coll.iter() {
                dst.add_delta(source_id, v.delta());
            }
        }
        for (key, coll) in &other.energy_usage {
            let dst = self.energy_usage.entry(*key).or_default();
            for (source_id, v) in coll.iter() {
                dst.add_delta(source_id, v.delta());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub pid: u32,
    pub cgroup_id: u64,
    pub container_id: String,
    pub vm_id: String,
    pub command: String,
    pub idle_counter: u32,
    pub usage: UsageTables,
}

impl ProcessStats {
    pub fn new(pid: u32, command: impl Into<String>) -> Self {
        Self {
            pid,
            cgroup_id: 0,
            container_id: SYSTEM_CONTAINER_ID.to_string(),
            vm_id: String::new(),
            command: command.into(),
            idle_counter: 0,
            usage: UsageTables::default(),
        }
    }

    pub fn mark_observed(&mut self) {
        self.idle_counter = 0;
    }

    pub fn tick_idle(&mut self) {
        self.idle_counter += 1;
    }

    pub fn should_cleanup(&self, cleanup_threshold: u32) -> bool {
        self.idle_counter >= cleanup_threshold
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    pub container_id: String,
    pub pids: HashSet<u32>,
    pub usage: UsageTables,
}

#[derive(Debug, Clone, Default)]
pub struct VMStats {
    pub vm_id: String,
    pub pids: HashSet<u32>,
    pub usage: UsageTables,
}

pub struct NodeStats {
    pub usage: UsageTables,
    /// One estimator per energy domain, keyed by the domain it separates
    /// idle/dynamic energy for (§3, §4.E). NodeStats exclusively owns
    /// these.
    pub idle_states: HashMap<EnergyDomain, IdleEnergyState>,
}

impl NodeStats {
    pub fn new(history_size: usize) -> Self {
        let mut idle_states = HashMap::new();
        for d in EnergyDomain::ALL {
            idle_states.insert(d, IdleEnergyState::new(history_size));
        }
        Self { usage: UsageTables::default(), idle_states }
    }
}

/// Rebuild container and VM rollups from the current process map (§4.D).
/// Container and VM entities reset their `pids` set every tick and are
/// repopulated by iterating the process map; each resource/energy metric
/// is the sum over member processes.
pub fn rebuild_rollups(
    processes: &HashMap<u32, ProcessStats>,
) -> (HashMap<String, ContainerStats>, HashMap<String, VMStats>) {
    let mut containers: HashMap<String, ContainerStats> = HashMap::new();
    let mut vms: HashMap<String, VMStats> = HashMap::new();

    for p in processes.values() {
        let c = containers.entry(p.container_id.clone()).or_insert_with(|| ContainerStats {
            container_id: p.container_id.clone(),
            pids: HashSet::new(),
            usage: UsageTables::default(),
        });
        c.pids.insert(p.pid);
        c.usage.add_from(&p.usage);

        if !p.vm_id.is_empty() {
            let v = vms.entry(p.vm_id.clone()).or_insert_with(|| VMStats {
                vm_id: p.vm_id.clone(),
                pids: HashSet::new(),
                usage: UsageTables::default(),
            });
            v.pids.insert(p.pid);
            v.usage.add_from(&p.usage);
        }
    }

    (containers, vms)
}

/// Aggregate node resource/energy usage as the sum over every process
/// (including the synthetic kernel process).
pub fn rollup_node(node: &mut NodeStats, processes: &HashMap<u32, ProcessStats>) {
    node.usage.resource_usage.clear();
    node.usage.energy_usage.retain(|k, _| k.mode == crate::metric_name::EnergyMode::Idle);
    for p in processes.values() {
        node.usage.add_from(&p.usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_with_cpu_time(pid: u32, container: &str, cpu_ms: u64) -> ProcessStats {
        let mut p = ProcessStats::new(pid, format!("proc{pid}"));
        p.container_id = container.to_string();
        p.usage.resource(ResourceMetric::CpuTime).add_delta(crate::stats::GENERIC_SOURCE, cpu_ms);
        p
    }

    #[test]
    fn container_rollup_sums_member_cpu_time() {
        let mut processes = HashMap::new();
        processes.insert(1, proc_with_cpu_time(1, "C", 30_000));
        processes.insert(2, proc_with_cpu_time(2, "C", 30_000));

        let (containers, _vms) = rebuild_rollups(&processes);
        let c = &containers["C"];
        assert_eq!(
            c.usage.resource_get(ResourceMetric::CpuTime).unwrap().sum_all_delta(),
            60_000
        );
        assert_eq!(c.pids.len(), 2);
    }

    #[test]
    fn node_rollup_sums_across_all_processes() {
        let mut processes = HashMap::new();
        processes.insert(1, proc_with_cpu_time(1, "C", 30_000));
        processes.insert(2, proc_with_cpu_time(2, "D", 30_000));
        let mut node = NodeStats::new(4);
        rollup_node(&mut node, &processes);
        assert_eq!(
            node.usage.resource_get(ResourceMetric::CpuTime).unwrap().sum_all_delta(),
            60_000
        );
    }

    #[test]
    fn reset_delta_preserves_idle_energy_zeros_others() {
        let mut u = UsageTables::default();
        u.resource(ResourceMetric::CpuTime).add_delta("total", 100);
        u.energy(EnergyDomain::Pkg, EnergyMode::Absolute).add_delta("s0", 50);
        u.energy(EnergyDomain::Pkg, EnergyMode::Idle).add_delta("s0", 20);
        u.reset_delta();
        assert_eq!(u.resource_get(ResourceMetric::CpuTime).unwrap().sum_all_delta(), 0);
        assert_eq!(u.energy_get(EnergyDomain::Pkg, EnergyMode::Absolute).unwrap().sum_all_delta(), 0);
        assert_eq!(u.energy_get(EnergyDomain::Pkg, EnergyMode::Idle).unwrap().sum_all_delta(), 20);
    }

    #[test]
    fn reset_delta_is_idempotent() {
        let mut u = UsageTables::default();
        u.resource(ResourceMetric::CpuTime).add_delta("total", 100);
        u.reset_delta();
        let after_first = u.resource_get(ResourceMetric::CpuTime).unwrap().sum_all_aggr();
        u.reset_delta();
        assert_eq!(after_first, u.resource_get(ResourceMetric::CpuTime).unwrap().sum_all_aggr());
    }

    #[test]
    fn rollup_empty_vm_id_not_tracked() {
        let mut processes = HashMap::new();
        processes.insert(1, proc_with_cpu_time(1, "C", 1000));
        let (_containers, vms) = rebuild_rollups(&processes);
        assert!(vms.is_empty());
    }
}
