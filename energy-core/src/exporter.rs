//! Metric exporter (§4.H, interface only): the core renders a
//! scrape-ready text listing from a point-in-time snapshot taken under
//! the manager's mutex; the HTTP transport that serves this text is an
//! out-of-scope collaborator (`energy-agentd::http`).

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::entities::{ContainerStats, NodeStats, ProcessStats, VMStats};
use crate::metric_name::{EnergyDomain, EnergyMode};

/// A read-only, point-in-time view of everything the exporter needs.
/// Borrowed under the same mutex the manager holds during a tick write,
/// so a scrape never observes a half-written tick (§4.G, §5).
pub struct NodeSnapshot<'a> {
    pub hostname: &'a str,
    pub node: &'a NodeStats,
    pub processes: &'a HashMap<u32, ProcessStats>,
    pub containers: &'a HashMap<String, ContainerStats>,
    pub vms: &'a HashMap<String, VMStats>,
}

/// Collaborator surface: anything that can accept a rendered scrape
/// payload (an HTTP handler, a log sink for debugging, a test harness).
pub trait MetricSink {
    fn accept(&mut self, rendered: &str);
}

/// Renders one counter-like numeric per (metric, entity, source_id)
/// tuple, labeled with entity identifiers and a `mode` for energy
/// metrics, in a Prometheus-style text exposition format.
#[derive(Debug, Default)]
pub struct TextExporter;

impl TextExporter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, snapshot: &NodeSnapshot<'_>) -> String {
        let mut out = String::new();

        self.render_entity(
            &mut out,
            "node",
            &[("host", snapshot.hostname)],
            &snapshot.node.usage,
        );

        for (container_id, c) in snapshot.containers {
            self.render_entity(
                &mut out,
                "container",
                &[("container_id", container_id.as_str())],
                &c.usage,
            );
        }

        for (vm_id, v) in snapshot.vms {
            self.render_entity(&mut out, "vm", &[("vm_id", vm_id.as_str())], &v.usage);
        }

        for p in snapshot.processes.values() {
            let pid_s = p.pid.to_string();
            self.render_entity(
                &mut out,
                "process",
                &[
                    ("pid", pid_s.as_str()),
                    ("command", p.command.as_str()),
                    ("container_id", p.container_id.as_str()),
                    ("vm_id", p.vm_id.as_str()),
                ],
                &p.usage,
            );
        }

        // Idle-energy diagnostics, once per energy domain at node scope.
        for domain in EnergyDomain::ALL {
            if let Some(state) = snapshot.node.idle_states.get(&domain) {
                let _ = writeln!(
                    out,
                    "energy_idle_estimate_mj{{entity=\"node\",domain=\"{}\"}} {}",
                    domain,
                    state.calculated_idle_energy()
                );
                let _ = writeln!(
                    out,
                    "energy_idle_reliable{{entity=\"node\",domain=\"{}\"}} {}",
                    domain,
                    state.is_idle_power_reliable() as u8
                );
            }
        }

        out
    }

    fn render_entity(
        &self,
        out: &mut String,
        entity: &str,
        labels: &[(&str, &str)],
        usage: &crate::entities::UsageTables,
    ) {
        let label_str = |extra: &[(&str, &str)]| -> String {
            let mut parts: Vec<String> =
                labels.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect();
            parts.extend(extra.iter().map(|(k, v)| format!("{k}=\"{v}\"")));
            parts.join(",")
        };

        for (metric, coll) in &usage.resource_usage {
            for (source_id, value) in coll.iter() {
                let _ = writeln!(
                    out,
                    "resource_usage{{entity=\"{entity}\",{},metric=\"{metric}\",source=\"{source_id}\"}} {}",
                    label_str(&[]),
                    value.aggr()
                );
            }
        }

        for (key, coll) in &usage.energy_usage {
            for (source_id, value) in coll.iter() {
                let mode = match key.mode {
                    EnergyMode::Absolute => "absolute",
                    EnergyMode::Idle => "idle",
                    EnergyMode::Dynamic => "dynamic",
                };
                let _ = writeln!(
                    out,
                    "energy_usage_mj{{entity=\"{entity}\",{},domain=\"{}\",mode=\"{mode}\",source=\"{source_id}\"}} {}",
                    label_str(&[]),
                    key.domain,
                    value.aggr()
                );
            }
        }
    }
}
