use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::gvk::Gvk;
use crate::timeline::NamespacedName;

/// One observed pod lifetime: an open record has `end_ts = None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleInterval {
    pub start_ts: i64,
    pub end_ts: Option<i64>,
}

impl LifecycleInterval {
    pub fn open(start_ts: i64) -> Self {
        Self { start_ts, end_ts: None }
    }

    pub fn is_open(&self) -> bool {
        self.end_ts.is_none()
    }

    /// Duration of a closed interval. Panics if still open — callers must
    /// check [`Self::is_open`] first.
    pub fn duration(&self) -> i64 {
        self.end_ts.expect("duration() called on an open interval") - self.start_ts
    }
}

/// `(owner-kind, owner-namespaced-name) -> (pod-template-hash -> [interval])`.
/// Indexed by owner rather than pod name because simulated pods do not
/// retain their recorded names. This is the `(kind, name)` tuple-key
/// construct the wire format must support without a string pivot.
pub type PodLifecycleTable = HashMap<(Gvk, NamespacedName), HashMap<u64, Vec<LifecycleInterval>>>;

/// `record_pod_start`: append an open interval for `(owner, template_hash)`.
pub fn record_start(
    table: &mut PodLifecycleTable,
    owner_kind: Gvk,
    owner_name: NamespacedName,
    template_hash: u64,
    ts: i64,
) {
    table
        .entry((owner_kind, owner_name))
        .or_default()
        .entry(template_hash)
        .or_default()
        .push(LifecycleInterval::open(ts));
}

/// `record_pod_end`: close the most recent open interval for
/// `(owner, template_hash)`. If none is open, accepts out-of-order arrival
/// by opening-then-closing a new interval at `ts`.
pub fn record_end(
    table: &mut PodLifecycleTable,
    owner_kind: Gvk,
    owner_name: NamespacedName,
    template_hash: u64,
    ts: i64,
) {
    let intervals = table
        .entry((owner_kind, owner_name))
        .or_default()
        .entry(template_hash)
        .or_default();
    match intervals.iter_mut().rev().find(|iv| iv.is_open()) {
        Some(open) => open.end_ts = Some(ts.max(open.start_ts)),
        None => intervals.push(LifecycleInterval { start_ts: ts, end_ts: Some(ts) }),
    }
}

/// The representative-TTL heuristic: the longest closed interval observed
/// for `(owner, template_hash)`. See DESIGN.md for why "longest" was chosen
/// over "median".
pub fn longest_closed_interval(intervals: &[LifecycleInterval]) -> Option<i64> {
    intervals
        .iter()
        .filter(|iv| !iv.is_open())
        .map(|iv| iv.duration())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> (Gvk, NamespacedName) {
        (Gvk::new("apps", "v1", "Deployment"), NamespacedName::new("default", "web"))
    }

    #[test]
    fn start_then_end_closes_most_recent_open_record() {
        let mut table = PodLifecycleTable::new();
        let (kind, name) = owner();
        record_start(&mut table, kind.clone(), name.clone(), 7, 10);
        record_end(&mut table, kind.clone(), name.clone(), 7, 40);
        let intervals = &table[&(kind, name)][&7];
        assert_eq!(intervals, &[LifecycleInterval { start_ts: 10, end_ts: Some(40) }]);
    }

    #[test]
    fn end_without_start_opens_and_closes_at_same_ts() {
        let mut table = PodLifecycleTable::new();
        let (kind, name) = owner();
        record_end(&mut table, kind.clone(), name.clone(), 7, 40);
        let intervals = &table[&(kind, name)][&7];
        assert_eq!(intervals, &[LifecycleInterval { start_ts: 40, end_ts: Some(40) }]);
    }

    #[test]
    fn rename_across_pods_accumulates_under_same_owner_and_template() {
        let mut table = PodLifecycleTable::new();
        let (kind, name) = owner();
        record_start(&mut table, kind.clone(), name.clone(), 7, 10);
        record_end(&mut table, kind.clone(), name.clone(), 7, 40);
        record_start(&mut table, kind.clone(), name.clone(), 7, 50);
        let intervals = &table[&(kind, name)][&7];
        assert_eq!(
            intervals,
            &[
                LifecycleInterval { start_ts: 10, end_ts: Some(40) },
                LifecycleInterval { start_ts: 50, end_ts: None },
            ]
        );
    }

    #[test]
    fn longest_closed_interval_ignores_open_records() {
        let intervals = vec![
            LifecycleInterval { start_ts: 0, end_ts: Some(5) },
            LifecycleInterval { start_ts: 10, end_ts: Some(100) },
            LifecycleInterval::open(200),
        ];
        assert_eq!(longest_closed_interval(&intervals), Some(90));
    }
}
