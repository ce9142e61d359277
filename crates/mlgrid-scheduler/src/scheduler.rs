//! The scheduling transaction: rank, then claim.

use tracing::{debug, info};

use mlgrid_core::Resources;
use mlgrid_registry::{Model, Registry};
use mlgrid_tracker::{Claim, ClaimTable, TrackerError};

use crate::error::{SchedulerError, SchedulerResult};
use crate::filter::rank_hosts;

/// Selects a host for a model and reserves its capacity.
#[derive(Clone)]
pub struct Scheduler {
    registry: Registry,
    claims: ClaimTable,
}

impl Scheduler {
    pub fn new(registry: Registry, claims: ClaimTable) -> Self {
        Self { registry, claims }
    }

    /// Pick a host for `model` and claim `requested` capacity on it.
    ///
    /// Candidates are tried best-first; a host that lost its capacity
    /// between ranking and claiming is skipped rather than failing the
    /// whole schedule. `NoValidHost` propagates to the caller, which
    /// marks the model ERROR with a reason instead of leaving it in an
    /// intermediate state.
    pub fn schedule(&self, model: &Model, requested: Resources) -> SchedulerResult<Claim> {
        let hosts = self.registry.list_hosts()?;
        let ranked = rank_hosts(&hosts, &requested, &model.hints);
        debug!(model = %model.id, candidates = ranked.len(), "ranked candidate hosts");

        for hostname in ranked {
            match self.claims.claim(&hostname, requested) {
                Ok(claim) => {
                    info!(model = %model.id, host = %hostname, "host selected");
                    return Ok(claim);
                }
                // Lost a race against another claim; try the next host.
                Err(TrackerError::ResourcesUnavailable { host }) => {
                    debug!(model = %model.id, %host, "candidate filled up, trying next");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SchedulerError::NoValidHost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlgrid_registry::ComputeHost;

    fn setup(hosts: &[(&str, u32, u64)]) -> (Registry, Scheduler) {
        let registry = Registry::open_in_memory().unwrap();
        for (hostname, cpu, memory_mb) in hosts {
            let mut host = ComputeHost::new(*hostname, "noop");
            host.capacity = Resources::new(*cpu, *memory_mb, 100);
            registry.create_host(&host).unwrap();
        }
        let claims = ClaimTable::new(registry.clone());
        (registry.clone(), Scheduler::new(registry, claims))
    }

    #[test]
    fn picks_the_least_loaded_host() {
        let (_registry, scheduler) = setup(&[("a", 4, 4096), ("b", 4, 8192)]);
        let model = Model::new("mnist", "project-1", "user-1");
        let claim = scheduler.schedule(&model, Resources::new(2, 2048, 0)).unwrap();
        assert_eq!(claim.hostname(), "b");
    }

    #[test]
    fn no_valid_host_when_everything_is_full() {
        let (_registry, scheduler) = setup(&[("a", 2, 2048)]);
        let model = Model::new("mnist", "project-1", "user-1");
        match scheduler.schedule(&model, Resources::new(4, 4096, 0)) {
            Err(SchedulerError::NoValidHost) => {}
            other => panic!("expected NoValidHost, got {other:?}"),
        }
    }

    #[test]
    fn capacity_for_one_admits_exactly_one() {
        let (_registry, scheduler) = setup(&[("a", 2, 4096)]);
        let request = Resources::new(2, 4096, 0);

        let first = Model::new("first", "project-1", "user-1");
        let second = Model::new("second", "project-1", "user-1");

        let _claim = scheduler.schedule(&first, request).unwrap();
        match scheduler.schedule(&second, request) {
            Err(SchedulerError::NoValidHost) => {}
            other => panic!("expected NoValidHost, got {other:?}"),
        }
    }

    #[test]
    fn falls_through_to_next_candidate_when_raced() {
        let (registry, scheduler) = setup(&[("a", 4, 8192), ("b", 4, 4096)]);
        // Fill the best-ranked host behind the scheduler's back.
        let claims = ClaimTable::new(registry);
        let _held = claims.claim("a", Resources::new(4, 8192, 0)).unwrap();

        let model = Model::new("mnist", "project-1", "user-1");
        let claim = scheduler.schedule(&model, Resources::new(2, 2048, 0)).unwrap();
        assert_eq!(claim.hostname(), "b");
    }
}
