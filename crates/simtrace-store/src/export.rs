use std::collections::{HashMap, HashSet};

use simtrace_core::{
    canonical::CanonicalObject, timeline::NamespacedName, Gvk, KindIndex, LifecycleInterval,
    PodLifecycleTable, Trace, TimelineEvent, TrackerConfig,
};

use crate::filter::ExportFilter;

type ObjectKey = (Gvk, NamespacedName);

/// Replays the prefix up to `start_ts` to find the alive-at-start set,
/// re-emits real events in `(start_ts, end_ts]` with exclusions applied,
/// synthesizes closing deletes for excluded objects that were alive at
/// `start_ts`, then reduces the Kind Index and Pod Lifecycle Table to match
/// the exported prefix.
pub fn compute(
    config: TrackerConfig,
    events: &[TimelineEvent],
    pod_lifecycles: &PodLifecycleTable,
    start_ts: i64,
    end_ts: i64,
    filter: &ExportFilter,
) -> Trace {
    let mut alive_at_start = replay_prefix(events, start_ts);

    // When the recorded timeline has nothing at or before start_ts, there is
    // no earlier state to reconstruct: the window opens with whatever the
    // timeline's first moment contributes, folded onto start_ts rather than
    // its recorded timestamp, so the priming snapshot still carries it.
    let has_prior_history = events.iter().any(|e| e.ts <= start_ts);
    let fold_ts = if has_prior_history {
        None
    } else {
        events.iter().map(|e| e.ts).filter(|ts| *ts <= end_ts).min()
    };
    if let Some(fold_ts) = fold_ts {
        for event in events.iter().filter(|e| e.ts == fold_ts) {
            for (kind, name, canonical) in &event.applied {
                alive_at_start.insert((kind.clone(), name.clone()), canonical.clone());
            }
            for (kind, name, _) in &event.deleted {
                alive_at_start.remove(&(kind.clone(), name.clone()));
            }
        }
    }

    let mut excluded_live: HashSet<ObjectKey> = HashSet::new();
    let mut index: KindIndex = KindIndex::new();
    let mut out_events = Vec::new();

    let mut t0 = TimelineEvent::empty(start_ts);
    for ((kind, name), canonical) in &alive_at_start {
        if filter.excludes(kind, name, &canonical.0) {
            excluded_live.insert((kind.clone(), name.clone()));
            continue;
        }
        let hash = simtrace_core::content_hash(&canonical.0).0;
        index.entry(kind.clone()).or_default().insert(name.clone(), hash);
        t0.applied.push((kind.clone(), name.clone(), canonical.clone()));
    }
    if !t0.is_empty() {
        out_events.push(t0);
    }

    for event in events {
        if event.ts <= start_ts || event.ts > end_ts || Some(event.ts) == fold_ts {
            continue;
        }
        let mut out = TimelineEvent::empty(event.ts);

        for (kind, name, canonical) in &event.deleted {
            let key = (kind.clone(), name.clone());
            if excluded_live.remove(&key) {
                continue;
            }
            if let Some(kind_entries) = index.get_mut(kind) {
                kind_entries.remove(name);
            }
            out.deleted.push((kind.clone(), name.clone(), canonical.clone()));
        }

        for (kind, name, canonical) in &event.applied {
            let key = (kind.clone(), name.clone());
            if filter.excludes(kind, name, &canonical.0) {
                excluded_live.insert(key);
                if let Some(kind_entries) = index.get_mut(kind) {
                    kind_entries.remove(name);
                }
                continue;
            }
            excluded_live.remove(&key);
            let hash = simtrace_core::content_hash(&canonical.0).0;
            index.entry(kind.clone()).or_default().insert(name.clone(), hash);
            out.applied.push((kind.clone(), name.clone(), canonical.clone()));
        }

        if !out.is_empty() {
            out_events.push(out);
        }
    }

    if !excluded_live.is_empty() {
        let mut closing = TimelineEvent::empty(end_ts);
        let mut keys: Vec<&ObjectKey> = excluded_live.iter().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        for (kind, name) in keys {
            let canonical = alive_at_start
                .get(&(kind.clone(), name.clone()))
                .cloned()
                .unwrap_or_else(|| CanonicalObject(serde_json::Value::Null));
            closing.deleted.push((kind.clone(), name.clone(), canonical));
        }
        out_events.push(closing);
    }

    let live_owners: HashSet<ObjectKey> = index
        .iter()
        .flat_map(|(kind, names)| names.keys().map(move |n| (kind.clone(), n.clone())))
        .collect();

    let mut reduced_lifecycles: PodLifecycleTable = HashMap::new();
    for (owner, by_template) in pod_lifecycles {
        if !live_owners.contains(owner) {
            continue;
        }
        let mut kept_templates: HashMap<u64, Vec<LifecycleInterval>> = HashMap::new();
        for (template_hash, intervals) in by_template {
            let kept: Vec<LifecycleInterval> = intervals
                .iter()
                .filter_map(|iv| truncate(*iv, start_ts, end_ts))
                .collect();
            if !kept.is_empty() {
                kept_templates.insert(*template_hash, kept);
            }
        }
        if !kept_templates.is_empty() {
            reduced_lifecycles.insert(owner.clone(), kept_templates);
        }
    }

    let mut trace = Trace::new(config);
    trace.events = out_events;
    trace.index = index;
    trace.pod_lifecycles = reduced_lifecycles;
    trace
}

/// Fold every event with `ts <= start_ts` to find the set of objects alive
/// at `start_ts`, keyed by their last applied canonical form.
fn replay_prefix(events: &[TimelineEvent], start_ts: i64) -> HashMap<ObjectKey, CanonicalObject> {
    let mut alive = HashMap::new();
    for event in events {
        if event.ts > start_ts {
            break;
        }
        for (kind, name, canonical) in &event.applied {
            alive.insert((kind.clone(), name.clone()), canonical.clone());
        }
        for (kind, name, _) in &event.deleted {
            alive.remove(&(kind.clone(), name.clone()));
        }
    }
    alive
}

/// Clip `iv` to `[start_ts, end_ts]`; `None` if it falls entirely outside
/// the window. Open intervals (`end_ts: None`) stay open if they outlive
/// the window — only their timestamps are clipped, not their openness.
fn truncate(iv: LifecycleInterval, start_ts: i64, end_ts: i64) -> Option<LifecycleInterval> {
    if iv.start_ts > end_ts {
        return None;
    }
    if let Some(end) = iv.end_ts {
        if end < start_ts {
            return None;
        }
    }
    Some(LifecycleInterval {
        start_ts: iv.start_ts.max(start_ts),
        end_ts: iv.end_ts.map(|e| e.min(end_ts)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simtrace_core::lifecycle::record_start;

    fn web() -> (Gvk, NamespacedName) {
        (Gvk::new("apps", "v1", "Deployment"), NamespacedName::new("default", "web"))
    }

    fn applied_event(ts: i64, kind: Gvk, name: NamespacedName, body: serde_json::Value) -> TimelineEvent {
        let mut e = TimelineEvent::empty(ts);
        e.applied.push((kind, name, CanonicalObject(body)));
        e
    }

    fn deleted_event(ts: i64, kind: Gvk, name: NamespacedName, body: serde_json::Value) -> TimelineEvent {
        let mut e = TimelineEvent::empty(ts);
        e.deleted.push((kind, name, CanonicalObject(body)));
        e
    }

    #[test]
    fn scenario_single_apply_full_window() {
        let (kind, name) = web();
        let events = vec![applied_event(100, kind.clone(), name.clone(), json!({"metadata": {"name": "web"}}))];
        let trace = compute(TrackerConfig::default(), &events, &PodLifecycleTable::new(), 50, 200, &ExportFilter::default());

        assert_eq!(trace.events.len(), 1);
        assert_eq!(trace.events[0].ts, 50);
        assert_eq!(trace.events[0].applied.len(), 1);
        let expected_hash = simtrace_core::content_hash(&json!({"metadata": {"name": "web"}})).0;
        assert_eq!(trace.index[&kind][&name], expected_hash);
    }

    #[test]
    fn scenario_apply_then_delete_spanning_both() {
        let (kind, name) = web();
        let events = vec![
            applied_event(100, kind.clone(), name.clone(), json!({"metadata": {"name": "web"}})),
            deleted_event(150, kind.clone(), name.clone(), json!({"metadata": {"name": "web"}})),
        ];
        let trace = compute(TrackerConfig::default(), &events, &PodLifecycleTable::new(), 90, 160, &ExportFilter::default());

        assert_eq!(trace.events.len(), 2);
        assert_eq!(trace.events[0].ts, 90);
        assert_eq!(trace.events[0].applied.len(), 1);
        assert_eq!(trace.events[1].ts, 150);
        assert_eq!(trace.events[1].deleted.len(), 1);
        assert!(trace.index.get(&kind).map_or(true, |m| m.is_empty()));
    }

    #[test]
    fn scenario_excludes_namespace() {
        let a = (Gvk::new("apps", "v1", "Deployment"), NamespacedName::new("default", "a"));
        let b = (Gvk::new("apps", "v1", "Deployment"), NamespacedName::new("kube-system", "b"));
        let events = vec![
            applied_event(0, a.0.clone(), a.1.clone(), json!({"metadata": {"name": "a"}})),
            applied_event(0, b.0.clone(), b.1.clone(), json!({"metadata": {"name": "b"}})),
        ];
        let filter = ExportFilter { excluded_namespaces: vec!["kube-system".to_string()], ..Default::default() };
        let trace = compute(TrackerConfig::default(), &events, &PodLifecycleTable::new(), 0, 1000, &filter);

        let names: Vec<&NamespacedName> = trace.events[0].applied.iter().map(|(_, n, _)| n).collect();
        assert!(names.contains(&&a.1));
        assert!(!names.contains(&&b.1));
        assert!(trace.index[&b.0].get(&b.1).is_none());
    }

    #[test]
    fn excluded_object_alive_at_start_gets_synthetic_delete_at_end() {
        let kind = Gvk::new("apps", "v1", "DaemonSet");
        let name = NamespacedName::new("kube-system", "fluentd");
        let events = vec![applied_event(0, kind.clone(), name.clone(), json!({"metadata": {"name": "fluentd"}}))];
        let filter = ExportFilter { exclude_daemonsets: true, ..Default::default() };
        let trace = compute(TrackerConfig::default(), &events, &PodLifecycleTable::new(), 0, 100, &filter);

        assert!(trace.events[0].applied.is_empty(), "excluded object must not appear in alive-at-start");
        let closing = trace.events.last().unwrap();
        assert_eq!(closing.ts, 100);
        assert_eq!(closing.deleted.len(), 1);
    }

    #[test]
    fn invalid_range_never_reached_here_is_the_stores_job() {
        // export::compute assumes a validated range; ObjectStore::export
        // rejects end < start before calling in.
        let trace = compute(TrackerConfig::default(), &[], &PodLifecycleTable::new(), 10, 10, &ExportFilter::default());
        assert!(trace.events.is_empty());
    }

    #[test]
    fn lifecycle_table_reduced_to_live_owners_and_truncated() {
        let (kind, name) = web();
        let events = vec![applied_event(0, kind.clone(), name.clone(), json!({"metadata": {"name": "web"}}))];
        let mut lifecycles = PodLifecycleTable::new();
        record_start(&mut lifecycles, kind.clone(), name.clone(), 7, 10);
        lifecycles.get_mut(&(kind.clone(), name.clone())).unwrap().get_mut(&7).unwrap()[0].end_ts = Some(500);

        let trace = compute(TrackerConfig::default(), &events, &lifecycles, 0, 100, &ExportFilter::default());
        let intervals = &trace.pod_lifecycles[&(kind, name)][&7];
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0], LifecycleInterval { start_ts: 10, end_ts: Some(100) });
    }
}
