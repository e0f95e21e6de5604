//! Ratio power model (§4.F): distributes node dynamic energy across
//! processes by each process's share of the paired resource metric.
//! Idle energy is never split here; node-level idle is reported
//! separately.

use std::collections::HashMap;

use crate::entities::{ProcessStats, UsageTables};
use crate::metric_name::{EnergyDomain, EnergyMode};
use crate::stats::GENERIC_SOURCE;

/// For a single energy domain, allocate `node_dynamic_energy_mj *
/// (feature_i / sum(feature))` to each process keyed by pid. If the
/// feature sum is zero, every process gets zero.
pub fn split_dynamic_energy(
    node_dynamic_energy_mj: u64,
    process_features: &HashMap<u32, u64>,
) -> HashMap<u32, u64> {
    let total: u64 = process_features.values().sum();
    let mut out = HashMap::with_capacity(process_features.len());
    if total == 0 {
        for pid in process_features.keys() {
            out.insert(*pid, 0);
        }
        return out;
    }
    for (pid, feature) in process_features {
        let share = (node_dynamic_energy_mj as f64) * (*feature as f64) / (total as f64);
        out.insert(*pid, share.round() as u64);
    }
    out
}

/// Run the ratio model for every energy domain and write each process's
/// share into its `energy_usage[domain, Dynamic]` StatCollection under
/// the generic (non-partitioned) source id.
pub fn apply_ratio_model(
    processes: &mut HashMap<u32, ProcessStats>,
    node_dynamic_energy_mj: &HashMap<EnergyDomain, u64>,
    resource_feature: impl Fn(&UsageTables, crate::metric_name::ResourceMetric) -> u64,
) {
    for domain in EnergyDomain::ALL {
        let resource = domain.paired_resource();
        let node_energy = *node_dynamic_energy_mj.get(&domain).unwrap_or(&0);

        let features: HashMap<u32, u64> = processes
            .iter()
            .map(|(pid, p)| (*pid, resource_feature(&p.usage, resource)))
            .collect();

        let shares = split_dynamic_energy(node_energy, &features);
        for (pid, share) in shares {
            if let Some(p) = processes.get_mut(&pid) {
                p.usage
                    .energy(domain, EnergyMode::Dynamic)
                    .set_delta(GENERIC_SOURCE, share);
            }
        }
    }
}
