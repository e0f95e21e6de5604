//! Flag/env parsing (§6). Manual `arg_flag`/`arg_value` helpers plus
//! `std::env::var` fallbacks, with flag-or-env checks generalized to
//! this binary's `ENERGYD_*` variables.

pub fn arg_flag(name: &str) -> bool {
    std::env::args().any(|a| a == name)
}

pub fn arg_value(name: &str) -> Option<String> {
    let mut it = std::env::args();
    while let Some(a) = it.next() {
        if a == name {
            return it.next();
        }
    }
    None
}

fn flag_or_env(flag: &str, env: &str) -> bool {
    arg_flag(flag) || std::env::var(env).ok().as_deref() == Some("1")
}

/// Startup configuration assembled from CLI flags with environment
/// fallbacks, per §6's flag enumeration (bind address, metrics path,
/// per-feature enables).
pub struct Cli {
    pub bind: String,
    pub metrics_path: String,
    pub sample_period_sec: u64,
    pub gpu_enabled: bool,
    pub qat_enabled: bool,
    pub msr_enabled: bool,
    pub hw_counters_enabled: bool,
    pub apiserver_enabled: bool,
    pub estimated_idle_power: bool,
    pub redfish_credential_file: Option<String>,
}

impl Cli {
    pub fn parse() -> Self {
        let bind = arg_value("--bind")
            .or_else(|| std::env::var("ENERGYD_BIND").ok())
            .unwrap_or_else(|| "0.0.0.0:9555".to_string());

        let metrics_path = arg_value("--metrics-path")
            .or_else(|| std::env::var("ENERGYD_METRICS_PATH").ok())
            .unwrap_or_else(|| "/metrics".to_string());

        let sample_period_sec = arg_value("--sample-period-sec")
            .or_else(|| std::env::var("ENERGYD_SAMPLE_PERIOD_SEC").ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3);

        Self {
            bind,
            metrics_path,
            sample_period_sec,
            gpu_enabled: flag_or_env("--gpu", "ENERGYD_GPU"),
            qat_enabled: flag_or_env("--qat", "ENERGYD_QAT"),
            msr_enabled: flag_or_env("--msr", "ENERGYD_MSR"),
            hw_counters_enabled: flag_or_env("--hw-counters", "ENERGYD_HW_COUNTERS"),
            apiserver_enabled: flag_or_env("--apiserver", "ENERGYD_APISERVER"),
            estimated_idle_power: flag_or_env("--estimated-idle-power", "ENERGYD_ESTIMATED_IDLE_POWER"),
            redfish_credential_file: arg_value("--redfish-credential-file")
                .or_else(|| std::env::var("ENERGYD_REDFISH_CREDENTIAL_FILE").ok()),
        }
    }
}
