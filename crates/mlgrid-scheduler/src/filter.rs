//! Host filtering and ranking.
//!
//! Filtering applies the hard constraints: host availability, free
//! capacity, and hints. Ranking orders the survivors least-loaded
//! first (most free memory), with hostname as the deterministic
//! tie-breaker.

use std::collections::HashMap;

use mlgrid_core::Resources;
use mlgrid_registry::{ComputeHost, HostStatus};

/// Hint key pinning the model to one hostname.
pub const HINT_HOST: &str = "host";

/// Hint key excluding a hostname (anti-affinity).
pub const HINT_ANTI_HOST: &str = "anti_host";

/// Whether `host` can accept the request at all.
pub fn feasible(host: &ComputeHost, request: &Resources, hints: &HashMap<String, String>) -> bool {
    if host.status != HostStatus::Available {
        return false;
    }
    if let Some(pinned) = hints.get(HINT_HOST) {
        if *pinned != host.hostname {
            return false;
        }
    }
    if let Some(excluded) = hints.get(HINT_ANTI_HOST) {
        if *excluded == host.hostname {
            return false;
        }
    }
    host.free().fits(request)
}

/// Feasible hostnames, best candidate first.
pub fn rank_hosts(
    hosts: &[ComputeHost],
    request: &Resources,
    hints: &HashMap<String, String>,
) -> Vec<String> {
    let mut survivors: Vec<&ComputeHost> = hosts
        .iter()
        .filter(|host| feasible(host, request, hints))
        .collect();
    survivors.sort_by(|a, b| {
        b.free()
            .memory_mb
            .cmp(&a.free().memory_mb)
            .then_with(|| a.hostname.cmp(&b.hostname))
    });
    survivors
        .into_iter()
        .map(|host| host.hostname.clone())
        .collect()
}
