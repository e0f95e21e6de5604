//! QAT (Intel QuickAssist) accelerator reader. No in-tree vendor binding
//! is available in this workspace, so this source is always
//! `is_supported() == false` — its metric is simply absent from the node
//! rather than zeroed, per §4.B.

use std::sync::atomic::{AtomicBool, Ordering};

use energy_core::energy_source::{EnergyReading, EnergySource};
use energy_core::error::SourceError;

pub struct QatSource {
    stopped: AtomicBool,
}

impl QatSource {
    pub fn new() -> Self {
        Self { stopped: AtomicBool::new(false) }
    }
}

impl Default for QatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergySource for QatSource {
    fn name(&self) -> &str {
        "qat"
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn read(&self) -> Result<EnergyReading, SourceError> {
        Err(SourceError::Unsupported { name: self.name().to_string() })
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}
