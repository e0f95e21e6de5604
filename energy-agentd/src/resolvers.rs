//! Entity resolution collaborators (§6): cgroup→container and pid→VM
//! lookups via `/proc/<pid>/cgroup`. Both are fallible by design; the
//! core applies the "system"/empty fallback (see
//! `energy_core::resolution`).

use std::fs;

use energy_core::error::ResolveError;
use energy_core::resolution::{CgroupResolver, VmResolver};
use once_cell::sync::Lazy;
use regex::Regex;

static CONTAINER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9a-f]{64}").expect("valid regex"));

static VM_SCOPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"machine-qemu.*\.scope").expect("valid regex"));

fn read_cgroup_file(pid: u32) -> Result<String, ResolveError> {
    fs::read_to_string(format!("/proc/{pid}/cgroup"))
        .map_err(|e| ResolveError::Io(e.to_string()))
}

pub struct ProcfsCgroupResolver;

impl CgroupResolver for ProcfsCgroupResolver {
    fn cgroup_to_container(&self, pid: u32, _cgroup_id: u64) -> Result<String, ResolveError> {
        let contents = read_cgroup_file(pid)?;
        CONTAINER_ID_RE
            .find(&contents)
            .map(|m| m.as_str().to_string())
            .ok_or(ResolveError::NoCgroupMapping(pid))
    }
}

pub struct ProcfsVmResolver;

impl VmResolver for ProcfsVmResolver {
    fn pid_to_vm(&self, pid: u32) -> Result<String, ResolveError> {
        let contents = read_cgroup_file(pid)?;
        VM_SCOPE_RE
            .find(&contents)
            .map(|m| m.as_str().to_string())
            .ok_or(ResolveError::NoVmMapping(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_regex_matches_64_hex_chars() {
        let line = "12:pids:/docker/a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2";
        assert!(CONTAINER_ID_RE.is_match(line));
    }

    #[test]
    fn vm_scope_regex_matches_qemu_machine_scope() {
        let line = "1:name=systemd:/machine.slice/machine-qemu\\x2d1\\x2dinstance.scope";
        assert!(VM_SCOPE_RE.is_match(line));
    }

    #[test]
    fn non_matching_line_does_not_match_vm_scope() {
        let line = "1:name=systemd:/user.slice/user-1000.slice";
        assert!(!VM_SCOPE_RE.is_match(line));
    }
}
