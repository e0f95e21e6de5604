//! Node-local energy telemetry core: tracing & counter aggregation,
//! idle/dynamic energy decomposition, and ratio-based energy attribution
//! from the node down to processes, containers, and VMs.
//!
//! This crate has no direct filesystem, network, or kernel dependency —
//! everything it needs from the outside world arrives through the trait
//! objects in [`energy_source`], [`resolution`], and [`trace`]. The
//! concrete implementations of those traits (sysfs readers, cgroup
//! lookups, the eBPF ring-buffer reader, the HTTP scrape surface) live in
//! the `energy-agentd` binary crate.

pub mod config;
pub mod energy_source;
pub mod entities;
pub mod error;
pub mod exporter;
pub mod idle;
pub mod manager;
pub mod metric_name;
pub mod power_model;
pub mod resolution;
pub mod stats;
pub mod trace;
