//! Uniform access to package/platform/GPU/QAT energy readings (§4.B, §6).
//!
//! The core never treats a reading's wrap-to-zero as a negative delta:
//! energy sources always report an *absolute* mJ-since-process-start
//! counter per source id, and the conversion to a delta happens through
//! [`crate::stats::StatValue::set_aggr`], which already encodes the
//! wrap-is-not-a-decrease rule.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SourceError;

/// `source_id -> mJ since process start`.
pub type EnergyReading = HashMap<String, u64>;

pub trait EnergySource: Send + Sync {
    fn name(&self) -> &str;

    /// Decided once at startup; if false, the metric is absent from the
    /// node (not zeroed).
    fn is_supported(&self) -> bool;

    fn read(&self) -> Result<EnergyReading, SourceError>;

    /// Releases file descriptors / optional telemetry.
    fn stop(&self);
}

/// Outcome of reading one source for a single tick.
pub struct SourceReadOutcome {
    pub name: String,
    pub result: Result<EnergyReading, SourceError>,
}

async fn read_one(source: Arc<dyn EnergySource>, timeout: Duration) -> SourceReadOutcome {
    let name = source.name().to_string();
    let blocking = tokio::task::spawn_blocking(move || source.read());
    match tokio::time::timeout(timeout, blocking).await {
        Ok(Ok(result)) => SourceReadOutcome { name, result },
        Ok(Err(join_err)) => SourceReadOutcome {
            result: Err(SourceError::Io {
                name: name.clone(),
                message: format!("read task panicked: {join_err}"),
            }),
            name,
        },
        Err(_elapsed) => SourceReadOutcome {
            result: Err(SourceError::Io {
                name: name.clone(),
                message: format!("read exceeded soft timeout of {timeout:?}"),
            }),
            name,
        },
    }
}

/// Fan-out read across every supported source (§4.G step 1: concurrent,
/// fan-out/fan-in). Each source runs on its own blocking task with a
/// per-source soft timeout (§5); a per-source failure or timeout
/// (§7 kind 3, transient) never fails the whole call — it's reported in
/// the outcome for the caller to log and skip that metric this tick.
pub async fn read_all_supported(
    sources: &[Arc<dyn EnergySource>],
    timeout: Duration,
) -> Vec<SourceReadOutcome> {
    let handles: Vec<_> = sources
        .iter()
        .filter(|s| s.is_supported())
        .cloned()
        .map(|s| tokio::spawn(read_one(s, timeout)))
        .collect();

    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(outcome) = handle.await {
            out.push(outcome);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeSource {
        name: &'static str,
        supported: bool,
        fail: AtomicBool,
        sleep: Duration,
    }

    impl EnergySource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }
        fn is_supported(&self) -> bool {
            self.supported
        }
        fn read(&self) -> Result<EnergyReading, SourceError> {
            if !self.sleep.is_zero() {
                std::thread::sleep(self.sleep);
            }
            if self.fail.load(Ordering::Relaxed) {
                Err(SourceError::Io { name: self.name.into(), message: "boom".into() })
            } else {
                let mut m = HashMap::new();
                m.insert("socket0".to_string(), 1000u64);
                Ok(m)
            }
        }
        fn stop(&self) {}
    }

    fn fast(name: &'static str, supported: bool, fail: bool) -> Arc<dyn EnergySource> {
        Arc::new(FakeSource { name, supported, fail: AtomicBool::new(fail), sleep: Duration::ZERO })
    }

    #[tokio::test]
    async fn unsupported_sources_are_skipped_entirely() {
        let sources = vec![fast("pkg", true, false), fast("qat", false, false)];
        let out = read_all_supported(&sources, Duration::from_millis(100)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "pkg");
    }

    #[tokio::test]
    async fn one_source_failing_does_not_affect_others() {
        let sources = vec![fast("pkg", true, true), fast("dram", true, false)];
        let out = read_all_supported(&sources, Duration::from_millis(100)).await;
        assert!(out.iter().find(|o| o.name == "pkg").unwrap().result.is_err());
        assert!(out.iter().find(|o| o.name == "dram").unwrap().result.is_ok());
    }

    #[tokio::test]
    async fn slow_source_is_reported_as_error_without_blocking_fast_ones() {
        let slow: Arc<dyn EnergySource> = Arc::new(FakeSource {
            name: "slow",
            supported: true,
            fail: AtomicBool::new(false),
            sleep: Duration::from_millis(200),
        });
        let sources = vec![slow, fast("fast", true, false)];
        let start = std::time::Instant::now();
        let out = read_all_supported(&sources, Duration::from_millis(20)).await;
        assert!(start.elapsed() < Duration::from_millis(150), "soft timeout should cut the slow source short");
        assert!(out.iter().find(|o| o.name == "slow").unwrap().result.is_err());
        assert!(out.iter().find(|o| o.name == "fast").unwrap().result.is_ok());
    }
}
