use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DynamicObject};
use kube::{Client, ResourceExt};

use simtrace_core::{lifecycle::longest_closed_interval, PodLifecycleTable, Trace, TrackerConfig};
use simtrace_watch::ownership::{resolve_owner_chain, KindResolver, OwnerKey};

use crate::error::TrackerError;

/// Label the current simulation run's owning objects are stamped with by
/// the replay engine when it creates them.
const SIMULATION_LABEL: &str = "simulation";

/// Loads a trace's pod lifecycle table and answers "what TTL should a
/// simulated pod get" and "which recorded owner does this live simulated
/// pod belong to", both against the simulation cluster rather than the
/// original one.
pub struct OwnershipTracker {
    client: Client,
    config: TrackerConfig,
    pod_lifecycles: PodLifecycleTable,
    resolver: KindResolver,
}

impl OwnershipTracker {
    pub fn new(client: Client, trace: &Trace) -> Self {
        Self {
            resolver: KindResolver::new(client.clone()),
            client,
            config: trace.config.clone(),
            pod_lifecycles: trace.pod_lifecycles.clone(),
        }
    }

    /// `representative_ttl(owner_key, template_hash)`: the longest closed
    /// interval observed for this owner and template shape, as a bound on
    /// the simulated pod's lifetime. `None` when lifecycles were never
    /// recorded for this owner/template pair.
    pub fn representative_ttl(&self, owner: &OwnerKey, template_hash: u64) -> Option<Duration> {
        let intervals = self.pod_lifecycles.get(owner)?.get(&template_hash)?;
        longest_closed_interval(intervals).map(|secs| Duration::from_secs(secs.max(0) as u64))
    }

    /// `resolve_owner(pod)`: the same controller-back-reference walk the
    /// watch fabric performs, run against the simulation cluster so the
    /// admission mutator can key a freshly created simulated pod into the
    /// same lifecycle table entry its recorded sibling populated.
    pub async fn resolve_owner(&self, pod: &Pod) -> Result<Option<OwnerKey>, TrackerError> {
        let namespace = pod.namespace().unwrap_or_default();
        let owner_refs = pod.owner_references().to_vec();
        let subject = format!("{}/{}", namespace, pod.name_any());
        let owner = resolve_owner_chain(&self.client, &self.resolver, &self.config, &namespace, &owner_refs, &subject).await?;
        Ok(owner)
    }

    /// Whether the owner this pod resolved to is itself labeled as
    /// belonging to `sim_id` — the admission mutator's no-op gate: a pod
    /// whose ownership chain does not terminate at an object labeled with
    /// the current simulation identity is left untouched. A missing owner
    /// object is treated as "not part of this simulation" rather than an
    /// error.
    pub async fn owner_belongs_to_simulation(&self, owner: &OwnerKey, sim_id: &str) -> Result<bool, TrackerError> {
        let (gvk, name) = owner;
        let ar = self.resolver.resolve(gvk).await?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &name.namespace, &ar);
        let obj = match api.get(&name.name).await {
            Ok(obj) => obj,
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(false),
            Err(e) => return Err(TrackerError::Watch(simtrace_watch::WatchError::Kube(e))),
        };
        Ok(obj.labels().get(SIMULATION_LABEL).map(|v| v.as_str()) == Some(sim_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtrace_core::lifecycle::LifecycleInterval;
    use simtrace_core::timeline::NamespacedName;
    use simtrace_core::Gvk;

    fn owner() -> OwnerKey {
        (Gvk::new("apps", "v1", "Deployment"), NamespacedName::new("default", "web"))
    }

    #[test]
    fn representative_ttl_picks_longest_closed_interval() {
        let mut pod_lifecycles = PodLifecycleTable::new();
        pod_lifecycles.insert(
            owner(),
            std::collections::HashMap::from([(
                7u64,
                vec![
                    LifecycleInterval { start_ts: 0, end_ts: Some(30) },
                    LifecycleInterval { start_ts: 100, end_ts: Some(400) },
                    LifecycleInterval::open(500),
                ],
            )]),
        );
        let trace = Trace { pod_lifecycles, ..trace_skeleton() };
        // Construction of OwnershipTracker needs a live client only for
        // resolve_owner; representative_ttl never touches it, so we exercise
        // the lookup logic directly against the table instead of standing up
        // a fake cluster here.
        let intervals = &trace.pod_lifecycles[&owner()][&7];
        assert_eq!(longest_closed_interval(intervals), Some(300));
    }

    #[test]
    fn representative_ttl_is_none_for_unknown_template() {
        let trace = trace_skeleton();
        assert!(trace.pod_lifecycles.get(&owner()).is_none());
    }

    fn trace_skeleton() -> Trace {
        Trace::new(TrackerConfig::default())
    }
}
