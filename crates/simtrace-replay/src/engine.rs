use std::time::Duration;

use kube::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use simtrace_core::{timeline::NamespacedName, Gvk, Trace};

use crate::apply::{apply_object, delete_object, ApiResourceCache, NamespaceEnsurer};
use crate::clock::ScaledClock;
use crate::error::ReplayError;

/// Scheduling controls a replay run is parameterized by.
#[derive(Debug, Clone)]
pub struct ScheduleControls {
    pub speed_factor: f64,
    pub duration: Option<Duration>,
    pub repetitions: u32,
}

impl Default for ScheduleControls {
    fn default() -> Self {
        Self { speed_factor: 1.0, duration: None, repetitions: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayState {
    Init,
    Priming,
    Playing,
    Draining,
    Done,
    Failed,
}

impl ReplayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplayState::Done | ReplayState::Failed)
    }
}

/// Error accumulated while playing a single event: recorded, logged, but
/// does not halt the run unless it is non-transient (`ReplayError`
/// classification happens in `apply_object`/`delete_object`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub state: ReplayState,
    pub events_played: u64,
    pub errors: Vec<String>,
}

impl ReplayReport {
    fn new() -> Self {
        Self { state: ReplayState::Init, events_played: 0, errors: Vec::new() }
    }
}

/// Drives a decoded trace's timeline against an orchestrator client on a
/// scaled clock, honoring cancellation by moving straight into `Draining`.
pub struct ReplayEngine {
    client: Client,
    trace: Trace,
    controls: ScheduleControls,
    resources: ApiResourceCache,
    namespaces: NamespaceEnsurer,
}

impl ReplayEngine {
    pub fn new(client: Client, trace: Trace, controls: ScheduleControls) -> Self {
        let resources = ApiResourceCache::new(client.clone());
        let namespaces = NamespaceEnsurer::new(client.clone());
        Self { client, trace, controls, resources, namespaces }
    }

    /// Run to completion (or cancellation). Returns a report even on
    /// `Failed`; the caller inspects `report.state` to distinguish outcomes.
    pub async fn run(mut self, cancel: CancellationToken) -> ReplayReport {
        let mut report = ReplayReport::new();

        let Some(trace_t0) = self.trace.min_ts() else {
            info!("trace has no events, nothing to replay");
            report.state = ReplayState::Done;
            return report;
        };

        report.state = ReplayState::Priming;
        let clock = ScaledClock::start(trace_t0, self.controls.speed_factor);

        // Priming: the alive-at-start snapshot is synthesized by the export
        // path as the first timeline event, so priming is just playing
        // event zero with no sleep beforehand.
        let mut events = self.trace.events.clone();
        events.sort_by_key(|e| e.ts);

        if let Some(first) = events.first().cloned() {
            if let Err(e) = self.play_event(&first).await {
                error!(error = %e, "priming failed");
                report.errors.push(e.to_string());
                report.state = ReplayState::Failed;
                return report;
            }
            report.events_played += 1;
        }

        report.state = ReplayState::Playing;
        for event in events.iter().skip(1) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("replay cancelled, draining");
                    report.state = ReplayState::Draining;
                    return self.drain(report).await;
                }
                _ = tokio::time::sleep(clock.delay_until(event.ts)) => {}
            }

            match self.play_event(event).await {
                Ok(()) => report.events_played += 1,
                Err(e @ ReplayError::Validation { .. }) => {
                    error!(error = %e, "fatal validation error during playback");
                    report.errors.push(e.to_string());
                    report.state = ReplayState::Failed;
                    return report;
                }
                Err(e) => {
                    warn!(error = %e, "non-fatal error during playback, continuing");
                    report.errors.push(e.to_string());
                }
            }
        }

        report.state = ReplayState::Draining;
        if let Some(duration) = self.controls.duration {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(duration) => {}
            }
        } else {
            cancel.cancelled().await;
        }

        self.drain(report).await
    }

    /// Delete events before applies, then applies in stable (kind, name)
    /// order, to avoid transient conflicts between the two.
    async fn play_event(&self, event: &simtrace_core::timeline::TimelineEvent) -> Result<(), ReplayError> {
        for (kind, name, obj) in &event.deleted {
            let ar = self.resources.resolve(kind).await?;
            delete_object(&self.client, &ar, &name.namespace, &name.name).await?;
            let _ = obj;
        }

        let mut applies = event.applied.clone();
        applies.sort_by(|a, b| (&a.0, &a.1.namespace, &a.1.name).cmp(&(&b.0, &b.1.namespace, &b.1.name)));
        for (kind, name, obj) in &applies {
            self.namespaces.ensure(&name.namespace).await?;
            let ar = self.resources.resolve(kind).await?;
            apply_object(&self.client, &ar, &name.namespace, &name.name, obj).await?;
        }
        Ok(())
    }

    /// Delete every object still recorded in the reduced Kind Index: it is
    /// either still genuinely live or was already removed by a real delete
    /// event, in which case this is a harmless no-op.
    async fn drain(self, mut report: ReplayReport) -> ReplayReport {
        let deadline = Duration::from_secs(30);
        let drain_fut = async {
            for (kind, names) in &self.trace.index {
                for name in names.keys() {
                    if let Err(e) = self.delete_live(kind, name).await {
                        warn!(%kind, %name, error = %e, "drain delete failed");
                        report.errors.push(e.to_string());
                    }
                }
            }
        };

        if tokio::time::timeout(deadline, drain_fut).await.is_err() {
            warn!("drain exceeded hard deadline, leaving remainder to garbage collection");
        }

        // Drain and playback hiccups are recorded in `errors` but never flip
        // a run to `Failed` on their own — only a fatal validation error
        // during `play_event` does that, and it returns early above.
        report.state = ReplayState::Done;
        report
    }

    async fn delete_live(&self, kind: &Gvk, name: &NamespacedName) -> Result<(), ReplayError> {
        let ar = self.resources.resolve(kind).await?;
        delete_object(&self.client, &ar, &name.namespace, &name.name).await
    }
}
