//! Platform/baseboard energy reader (§6): discovers an ACPI power meter
//! under `/sys/class/hwmon/*` (subsystem "acpi", attribute `name` ==
//! "power_meter") and reads its cumulative energy counter.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use energy_core::energy_source::{EnergyReading, EnergySource};
use energy_core::error::SourceError;

const HWMON_ROOT: &str = "/sys/class/hwmon";

pub struct PlatformSource {
    energy_path: Option<PathBuf>,
    supported: AtomicBool,
}

impl PlatformSource {
    pub fn discover(root: &str) -> Self {
        let mut found = None;
        if let Ok(entries) = fs::read_dir(root) {
            for entry in entries.flatten() {
                let path = entry.path();
                let name = fs::read_to_string(path.join("name")).unwrap_or_default();
                if name.trim() == "power_meter" {
                    let candidate = path.join("energy1_input");
                    if candidate.exists() {
                        found = Some(candidate);
                        break;
                    }
                }
            }
        }
        let supported = found.is_some();
        Self { energy_path: found, supported: AtomicBool::new(supported) }
    }

    pub fn new() -> Self {
        Self::discover(HWMON_ROOT)
    }
}

impl Default for PlatformSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergySource for PlatformSource {
    fn name(&self) -> &str {
        "platform"
    }

    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::Relaxed)
    }

    fn read(&self) -> Result<EnergyReading, SourceError> {
        let path = self.energy_path.as_ref().ok_or_else(|| SourceError::Unsupported {
            name: self.name().to_string(),
        })?;
        let raw = fs::read_to_string(path)
            .map_err(|e| SourceError::Io { name: self.name().to_string(), message: e.to_string() })?;
        let uj: u64 = raw.trim().parse().map_err(|_| SourceError::Io {
            name: self.name().to_string(),
            message: "non-numeric energy1_input".to_string(),
        })?;
        let mut out = HashMap::new();
        out.insert("platform:baseboard".to_string(), uj / 1000);
        Ok(out)
    }

    fn stop(&self) {
        self.supported.store(false, Ordering::Relaxed);
    }
}
