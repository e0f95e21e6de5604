//! RAPL-style per-socket package/core/uncore/dram energy readers (§6).
//! Reads the cumulative `energy_uj` sysfs counters under
//! `/sys/class/powercap/intel-rapl:*` and converts microjoules to
//! millijoules. Each socket/domain pair is a source id.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use energy_core::energy_source::{EnergyReading, EnergySource};
use energy_core::error::SourceError;

const RAPL_ROOT: &str = "/sys/class/powercap";

struct RaplZone {
    domain: &'static str,
    socket: String,
    energy_uj_path: PathBuf,
}

pub struct RaplSource {
    zones: Vec<RaplZone>,
    supported: AtomicBool,
}

impl RaplSource {
    /// Discovers zones under `root` (overridable for tests). A zone's
    /// `name` file content decides which energy domain it maps to; only
    /// `package`, `core`, `uncore`, and `dram` are recognized, matching
    /// the metric vocabulary (§3).
    pub fn discover(root: &str) -> Self {
        let mut zones = Vec::new();
        if let Ok(entries) = fs::read_dir(root) {
            for entry in entries.flatten() {
                let path = entry.path();
                let name_path = path.join("name");
                let Ok(name) = fs::read_to_string(&name_path) else { continue };
                let name = name.trim();
                let domain = match name {
                    n if n.contains("core") => "core",
                    n if n.contains("uncore") => "uncore",
                    n if n.contains("dram") => "dram",
                    n if n == "package" || n.starts_with("package-") => "pkg",
                    _ => continue,
                };
                let socket = path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();
                zones.push(RaplZone { domain, socket, energy_uj_path: path.join("energy_uj") });
            }
        }
        let supported = !zones.is_empty();
        Self { zones, supported: AtomicBool::new(supported) }
    }

    pub fn new() -> Self {
        Self::discover(RAPL_ROOT)
    }
}

impl Default for RaplSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergySource for RaplSource {
    fn name(&self) -> &str {
        "rapl"
    }

    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::Relaxed)
    }

    fn read(&self) -> Result<EnergyReading, SourceError> {
        let mut out = HashMap::new();
        for zone in &self.zones {
            let raw = fs::read_to_string(&zone.energy_uj_path).map_err(|e| SourceError::Io {
                name: self.name().to_string(),
                message: format!("{}: {e}", zone.energy_uj_path.display()),
            })?;
            let uj: u64 = raw.trim().parse().map_err(|_| SourceError::Io {
                name: self.name().to_string(),
                message: format!("non-numeric energy_uj at {}", zone.energy_uj_path.display()),
            })?;
            let key = format!("{}:{}", zone.domain, zone.socket);
            out.insert(key, uj / 1000);
        }
        Ok(out)
    }

    fn stop(&self) {
        self.supported.store(false, Ordering::Relaxed);
    }
}
