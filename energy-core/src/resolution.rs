//! Entity resolution interface (§6): collaborator traits for mapping a
//! PID to its owning container/VM. Each lookup is fallible; the fallback
//! policy (synthetic "system" container, empty VM id) lives here in the
//! core, applied by the caller (the sampling manager), while the actual
//! cgroup/libvirt lookup is an out-of-scope collaborator implemented by
//! `energy-agentd`.

use crate::entities::SYSTEM_CONTAINER_ID;
use crate::error::ResolveError;

pub trait CgroupResolver: Send + Sync {
    fn cgroup_to_container(&self, pid: u32, cgroup_id: u64) -> Result<String, ResolveError>;
}

pub trait VmResolver: Send + Sync {
    fn pid_to_vm(&self, pid: u32) -> Result<String, ResolveError>;
}

/// Resolve with the §6 fallback policy applied.
pub fn resolve_container(resolver: &dyn CgroupResolver, pid: u32, cgroup_id: u64) -> String {
    resolver
        .cgroup_to_container(pid, cgroup_id)
        .unwrap_or_else(|_| SYSTEM_CONTAINER_ID.to_string())
}

/// Resolve with the §6 fallback policy applied (empty VM id on failure).
pub fn resolve_vm(resolver: &dyn VmResolver, pid: u32) -> String {
    resolver.pid_to_vm(pid).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;
    impl CgroupResolver for AlwaysFails {
        fn cgroup_to_container(&self, pid: u32, _cgroup_id: u64) -> Result<String, ResolveError> {
            Err(ResolveError::NoCgroupMapping(pid))
        }
    }
    impl VmResolver for AlwaysFails {
        fn pid_to_vm(&self, pid: u32) -> Result<String, ResolveError> {
            Err(ResolveError::NoVmMapping(pid))
        }
    }

    #[test]
    fn failed_container_lookup_falls_back_to_system() {
        assert_eq!(resolve_container(&AlwaysFails, 42, 7), SYSTEM_CONTAINER_ID);
    }

    #[test]
    fn failed_vm_lookup_falls_back_to_empty() {
        assert_eq!(resolve_vm(&AlwaysFails, 42), "");
    }
}
