//! Error kinds per the error-handling design: startup-fatal errors return to
//! the caller; degradation, transient, and data-anomaly errors are handled
//! locally and never propagate past their point of origin.

use thiserror::Error;

/// A failure reading from an energy source for a single tick. Always
/// transient (kind 3): the metric is skipped this tick, next tick retries.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {name} I/O error: {message}")]
    Io { name: String, message: String },
    #[error("source {name} is not supported on this host")]
    Unsupported { name: String },
}

/// A failure resolving a PID to its owning container/VM (kind 3/degradation,
/// handled by the caller falling back to the synthetic "system" container).
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no cgroup mapping for pid {0}")]
    NoCgroupMapping(u32),
    #[error("no vm mapping for pid {0}")]
    NoVmMapping(u32),
    #[error("lookup I/O error: {0}")]
    Io(String),
}

/// A malformed kernel trace record (kind 4/data anomaly): logged at low
/// verbosity and dropped, never propagated.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated record: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown event_type tag {0}")]
    UnknownEventType(u8),
}

/// Startup-fatal errors (kind 1): a mandatory subsystem failed to come up.
/// Returned to the entry point, which shuts down already-started
/// subsystems in reverse order and exits non-zero.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("mandatory probe failed to attach: {0}")]
    MandatoryProbeFailed(String),
    #[error("sampling ticker could not start: {0}")]
    TickerStartFailed(String),
}
