//! # Lifecycle orchestrator.
//!
//! [`LifecycleOrchestrator`] is the only component that calls lifecycle
//! methods on artifacts. It consumes the repository's push feed, defers node
//! events into a batch while the repository is (re)loading, and replays the
//! batch in dependency/phase order once loading completes.
//!
//! ## Rules
//! - Per-artifact lifecycle failures are logged, recorded as validation
//!   messages on the repository, and never abort a batch.
//! - `finish()` runs only after every first-phase start in the batch has
//!   returned.
//! - While the server is offline, offlineable artifacts get the offline
//!   variants of start and finish.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactRef, Capabilities, Repository, ValidationMessage};
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, ServiceError};
use crate::lifecycle::order::order_batch;
use crate::lifecycle::{LifecycleEvent, LifecycleKind, RepositoryPhase, RepositoryPhaseKind};

/// Outcome of a completed repository (re)load.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Whether this was the first completed load since construction.
    pub initial_load: bool,
    /// Artifacts started in this batch.
    pub started: Vec<String>,
    /// Artifacts stopped in this batch.
    pub stopped: Vec<String>,
    /// Artifacts that got their second start phase in this batch.
    pub finished: Vec<String>,
    /// Circular-reference warnings raised while ordering the batch.
    pub cycle_warnings: Vec<String>,
}

#[derive(Default)]
struct BatchState {
    loading: Option<RepositoryPhaseKind>,
    deferred: Vec<LifecycleEvent>,
}

/// Drives artifact lifecycle transitions off the repository's push feed.
pub struct LifecycleOrchestrator {
    repository: Arc<dyn Repository>,
    config: RuntimeConfig,
    state: Mutex<BatchState>,
    offline: Arc<AtomicBool>,
    shutting_down: AtomicBool,
    loaded_once: AtomicBool,
}

impl LifecycleOrchestrator {
    /// Creates an orchestrator over the given repository.
    ///
    /// When an offline marker path is configured and the file exists, the
    /// server comes up offline.
    pub fn new(repository: Arc<dyn Repository>, config: RuntimeConfig) -> Self {
        let offline = config
            .offline_marker
            .as_deref()
            .map(|p| p.exists())
            .unwrap_or(false);
        if offline {
            info!("offline marker present, starting in offline mode");
        }
        Self {
            repository,
            config,
            state: Mutex::new(BatchState::default()),
            offline: Arc::new(AtomicBool::new(offline)),
            shutting_down: AtomicBool::new(false),
            loaded_once: AtomicBool::new(false),
        }
    }

    /// Whether the server is currently offline.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Shared handle on the offline flag, read by the cluster dispatcher.
    pub(crate) fn offline_flag(&self) -> Arc<AtomicBool> {
        self.offline.clone()
    }

    /// Whether [`shutdown`](Self::shutdown) has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Reacts to a single node transition.
    ///
    /// While the repository is loading the event is deferred into the batch;
    /// otherwise it is acted on immediately, recursing over direct
    /// dependents.
    pub async fn handle_node_event(&self, event: LifecycleEvent) {
        {
            let mut state = self.state.lock().expect("batch lock poisoned");
            if state.loading.is_some() {
                state.deferred.push(event);
                return;
            }
        }
        match (event.kind, event.done) {
            (LifecycleKind::Load, true) => {
                if !self.run_eager(&event.node_id).await {
                    self.start_tree(&event.node_id).await;
                }
            }
            (LifecycleKind::Reload, true) => {
                if !self.run_eager(&event.node_id).await {
                    self.restart_tree(&event.node_id).await;
                }
            }
            // the artifact is still resolvable here and can be shut down
            (LifecycleKind::Unload, false) | (LifecycleKind::Reload, false) => {
                self.stop_tree(&event.node_id).await;
            }
            _ => {}
        }
    }

    /// Reacts to a repository-wide (re)load transition.
    ///
    /// Returns a [`BatchReport`] when a completed phase was processed.
    pub async fn handle_repository_phase(&self, phase: RepositoryPhase) -> Option<BatchReport> {
        if !phase.done {
            let mut state = self.state.lock().expect("batch lock poisoned");
            state.loading = Some(phase.kind);
            state.deferred.clear();
            debug!(kind = ?phase.kind, "repository loading, deferring node events");
            return None;
        }

        let mut batch = {
            let mut state = self.state.lock().expect("batch lock poisoned");
            state.loading = None;
            std::mem::take(&mut state.deferred)
        };

        dedup_by_node(&mut batch);
        let cycle_warnings =
            order_batch(self.repository.as_ref(), &mut batch, self.config.order_scan_cap);
        for warning in &cycle_warnings {
            warn!("{warning}");
        }

        let mut report = BatchReport {
            initial_load: phase.kind == RepositoryPhaseKind::Load
                && !self.loaded_once.swap(true, Ordering::SeqCst),
            cycle_warnings,
            ..BatchReport::default()
        };

        let mut pending_finish: Vec<ArtifactRef> = Vec::new();
        for event in batch {
            match (event.kind, event.done) {
                (LifecycleKind::Load, true) | (LifecycleKind::Reload, true) => {
                    if !self.run_eager(&event.node_id).await {
                        self.process_startup(&event, &mut report, &mut pending_finish)
                            .await;
                    }
                }
                (LifecycleKind::Unload, false) | (LifecycleKind::Reload, false) => {
                    if self.stop_one(&event.node_id).await {
                        report.stopped.push(event.node_id);
                    }
                }
                _ => {}
            }
        }

        // phase two only after every phase one in the batch has returned
        for artifact in pending_finish {
            if self.finish_one(&artifact).await {
                report.finished.push(artifact.id().to_string());
            }
        }

        Some(report)
    }

    async fn process_startup(
        &self,
        event: &LifecycleEvent,
        report: &mut BatchReport,
        pending_finish: &mut Vec<ArtifactRef>,
    ) {
        if self.config.disable_startup {
            return;
        }
        let Some(artifact) = self.repository.resolve(&event.node_id) else {
            warn!(node = %event.node_id, "node not resolvable after load, skipping startup");
            return;
        };
        let caps = artifact.capabilities();
        let started = if event.kind == LifecycleKind::Reload && caps.restartable && artifact.is_started()
        {
            self.record_call(artifact.id(), "restart", artifact.restart().await)
        } else {
            self.start_one(&artifact).await
        };
        if started {
            report.started.push(artifact.id().to_string());
            if caps.two_phase_start {
                pending_finish.push(artifact);
            }
        }
    }

    /// Starts one artifact; returns whether a start ran and succeeded.
    async fn start_one(&self, artifact: &ArtifactRef) -> bool {
        let caps = artifact.capabilities();
        if !caps.startable || artifact.is_started() {
            return false;
        }
        let result = if self.is_offline() && caps.offlineable {
            artifact.start_offline().await
        } else {
            artifact.start().await
        };
        self.record_call(artifact.id(), "start", result)
    }

    /// Halts (if two-phase) then stops one artifact; returns whether a stop
    /// ran and succeeded.
    async fn stop_one(&self, id: &str) -> bool {
        let Some(artifact) = self.repository.resolve(id) else {
            return false;
        };
        let caps = artifact.capabilities();
        if !caps.stoppable || !artifact.is_started() {
            return false;
        }
        if caps.two_phase_stop {
            self.record_call(id, "halt", artifact.halt().await);
        }
        self.record_call(id, "stop", artifact.stop().await)
    }

    async fn finish_one(&self, artifact: &ArtifactRef) -> bool {
        let caps = artifact.capabilities();
        if self.is_offline() && caps.offlineable {
            self.record_call(artifact.id(), "offline_finish", artifact.offline_finish().await)
        } else {
            self.record_call(artifact.id(), "finish", artifact.finish().await)
        }
    }

    /// Runs a node's service with empty input when the node is eager.
    ///
    /// Eager nodes get their service invoked in place of a start; returns
    /// whether the node was eager.
    async fn run_eager(&self, id: &str) -> bool {
        let eager = self
            .repository
            .node(id)
            .map(|n| n.eager)
            .unwrap_or(false);
        if !eager {
            return false;
        }
        let Some(service) = self.repository.service(id) else {
            warn!(node = id, "eager node has no service");
            return true;
        };
        info!(node = id, "running eager service");
        if let Err(err) = service.invoke(None).await {
            warn!(node = id, error = %err, "eager service failed");
            self.repository
                .record(ValidationMessage::failed(id, "eager", err.to_string()));
        }
        true
    }

    fn record_call(&self, id: &str, operation: &'static str, result: Result<(), ServiceError>) -> bool {
        match result {
            Ok(()) => {
                debug!(artifact = id, operation, "lifecycle operation completed");
                self.repository.record(ValidationMessage::ok(id, operation));
                true
            }
            Err(err) => {
                warn!(artifact = id, operation, error = %err, "lifecycle operation failed");
                self.repository
                    .record(ValidationMessage::failed(id, operation, err.to_string()));
                false
            }
        }
    }

    // every walk carries a visited set so a circular reference graph
    // terminates instead of recursing without bound

    async fn start_tree(&self, id: &str) {
        let mut visited = HashSet::new();
        self.start_walk(id.to_string(), &mut visited).await;
    }

    fn start_walk<'a>(&'a self, id: String, visited: &'a mut HashSet<String>) -> BoxFuture<'a, ()> {
        async move {
            if !visited.insert(id.clone()) {
                warn!(node = %id, "circular reference, node already visited in this walk");
                return;
            }
            if let Some(artifact) = self.repository.resolve(&id) {
                self.start_one(&artifact).await;
                if artifact.capabilities().two_phase_start {
                    self.finish_one(&artifact).await;
                }
            }
            for dependent in self.repository.dependents(&id) {
                self.start_walk(dependent, visited).await;
            }
        }
        .boxed()
    }

    async fn restart_tree(&self, id: &str) {
        let mut visited = HashSet::new();
        self.restart_walk(id.to_string(), &mut visited).await;
    }

    fn restart_walk<'a>(
        &'a self,
        id: String,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if !visited.insert(id.clone()) {
                warn!(node = %id, "circular reference, node already visited in this walk");
                return;
            }
            if let Some(artifact) = self.repository.resolve(&id) {
                let caps = artifact.capabilities();
                if caps.restartable && artifact.is_started() {
                    self.record_call(&id, "restart", artifact.restart().await);
                } else {
                    self.stop_one(&id).await;
                    self.start_one(&artifact).await;
                    if caps.two_phase_start {
                        self.finish_one(&artifact).await;
                    }
                }
            }
            for dependent in self.repository.dependents(&id) {
                self.restart_walk(dependent, visited).await;
            }
        }
        .boxed()
    }

    /// Dependents go down before the artifact they depend on.
    async fn stop_tree(&self, id: &str) {
        let mut visited = HashSet::new();
        self.stop_walk(id.to_string(), &mut visited).await;
    }

    fn stop_walk<'a>(&'a self, id: String, visited: &'a mut HashSet<String>) -> BoxFuture<'a, ()> {
        async move {
            if !visited.insert(id.clone()) {
                warn!(node = %id, "circular reference, node already visited in this walk");
                return;
            }
            for dependent in self.repository.dependents(&id) {
                self.stop_walk(dependent, visited).await;
            }
            self.stop_one(&id).await;
        }
        .boxed()
    }

    /// Starts an artifact and its dependents on demand.
    pub async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        if self.is_shutting_down() {
            return Err(RuntimeError::ShuttingDown { id: id.into() });
        }
        if self.repository.node(id).is_none() {
            return Err(RuntimeError::UnknownNode { id: id.into() });
        }
        self.start_tree(id).await;
        Ok(())
    }

    /// Stops an artifact after stopping its dependents.
    pub async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        if self.repository.node(id).is_none() {
            return Err(RuntimeError::UnknownNode { id: id.into() });
        }
        self.stop_tree(id).await;
        Ok(())
    }

    /// Restarts an artifact and its dependents.
    pub async fn restart(&self, id: &str) -> Result<(), RuntimeError> {
        if self.is_shutting_down() {
            return Err(RuntimeError::ShuttingDown { id: id.into() });
        }
        if self.repository.node(id).is_none() {
            return Err(RuntimeError::UnknownNode { id: id.into() });
        }
        self.restart_tree(id).await;
        Ok(())
    }

    /// Takes the whole server offline: sets the flag, creates the marker
    /// file when configured, and walks offlineable artifacts in reverse
    /// phase order.
    pub async fn bring_offline(&self) -> Result<(), RuntimeError> {
        if self.offline.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(path) = self.config.offline_marker.as_deref() {
            std::fs::write(path, b"").map_err(|source| RuntimeError::OfflineMarker {
                action: "create",
                source,
            })?;
        }
        info!("bringing server offline");
        let mut artifacts = self
            .repository
            .artifacts_with(|caps: &Capabilities| caps.offlineable);
        artifacts.sort_by_key(|a| std::cmp::Reverse(a.phase()));
        let mut pending: Vec<ArtifactRef> = Vec::new();
        for artifact in artifacts {
            if !artifact.is_started() {
                continue;
            }
            if self.record_call(artifact.id(), "offline", artifact.offline().await)
                && artifact.capabilities().two_phase_offline
            {
                pending.push(artifact);
            }
        }
        for artifact in pending {
            self.record_call(artifact.id(), "offline_finish", artifact.offline_finish().await);
        }
        Ok(())
    }

    /// Brings the server back online, mirroring [`bring_offline`](Self::bring_offline)
    /// in normal phase order.
    pub async fn bring_online(&self) -> Result<(), RuntimeError> {
        if !self.offline.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(path) = self.config.offline_marker.as_deref() {
            if path.exists() {
                std::fs::remove_file(path).map_err(|source| RuntimeError::OfflineMarker {
                    action: "remove",
                    source,
                })?;
            }
        }
        info!("bringing server online");
        let mut artifacts = self
            .repository
            .artifacts_with(|caps: &Capabilities| caps.offlineable);
        artifacts.sort_by_key(|a| a.phase());
        let mut pending: Vec<ArtifactRef> = Vec::new();
        for artifact in artifacts {
            if !artifact.is_started() {
                continue;
            }
            if self.record_call(artifact.id(), "online", artifact.online().await)
                && artifact.capabilities().two_phase_offline
            {
                pending.push(artifact);
            }
        }
        for artifact in pending {
            self.record_call(artifact.id(), "online_finish", artifact.online_finish().await);
        }
        Ok(())
    }

    /// Shuts every started artifact down in reverse phase order: a halt pass
    /// over the two-phase-stoppable ones first, then a stop pass.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down artifacts");
        let mut artifacts = self
            .repository
            .artifacts_with(|caps: &Capabilities| caps.stoppable || caps.two_phase_stop);
        artifacts.sort_by_key(|a| std::cmp::Reverse(a.phase()));

        for artifact in &artifacts {
            if artifact.capabilities().two_phase_stop && artifact.is_started() {
                self.record_call(artifact.id(), "halt", artifact.halt().await);
            }
        }
        for artifact in &artifacts {
            if artifact.capabilities().stoppable && artifact.is_started() {
                self.record_call(artifact.id(), "stop", artifact.stop().await);
            }
        }
    }
}

/// Keeps the last event per node id; later events supersede earlier ones.
fn dedup_by_node(batch: &mut Vec<LifecycleEvent>) {
    let mut seen = HashSet::new();
    let mut keep = vec![false; batch.len()];
    for i in (0..batch.len()).rev() {
        keep[i] = seen.insert(batch[i].node_id.clone());
    }
    let mut flags = keep.into_iter();
    batch.retain(|_| flags.next().unwrap_or(false));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Artifact, MemoryRepository, StartPhase};
    use crate::services::ServiceFn;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct Probe {
        id: &'static str,
        caps: Capabilities,
        phase: StartPhase,
        started: AtomicBool,
        fail_start: bool,
        log: CallLog,
    }

    impl Probe {
        fn new(id: &'static str, caps: Capabilities, log: CallLog) -> Arc<Self> {
            Arc::new(Self {
                id,
                caps,
                phase: StartPhase::Normal,
                started: AtomicBool::new(false),
                fail_start: false,
                log,
            })
        }

        fn record(&self, op: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.id, op));
        }
    }

    #[async_trait]
    impl Artifact for Probe {
        fn id(&self) -> &str {
            self.id
        }
        fn phase(&self) -> StartPhase {
            self.phase
        }
        fn capabilities(&self) -> Capabilities {
            self.caps
        }
        fn is_started(&self) -> bool {
            self.started.load(Ordering::SeqCst)
        }
        async fn start(&self) -> Result<(), ServiceError> {
            if self.fail_start {
                return Err(ServiceError::remote("start refused"));
            }
            self.record("start");
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) -> Result<(), ServiceError> {
            self.record("stop");
            self.started.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn restart(&self) -> Result<(), ServiceError> {
            self.record("restart");
            Ok(())
        }
        async fn halt(&self) -> Result<(), ServiceError> {
            self.record("halt");
            Ok(())
        }
        async fn finish(&self) -> Result<(), ServiceError> {
            self.record("finish");
            Ok(())
        }
    }

    fn orchestrator(repo: Arc<MemoryRepository>) -> LifecycleOrchestrator {
        LifecycleOrchestrator::new(repo, RuntimeConfig::new("alpha", "main"))
    }

    fn load_event(id: &str) -> LifecycleEvent {
        LifecycleEvent::new(id, LifecycleKind::Load, true)
    }

    #[tokio::test]
    async fn test_events_deferred_while_loading_and_ordered_on_done() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(Probe::new("base", Capabilities::service(), log.clone()), vec![]);
        repo.insert(
            Probe::new("web", Capabilities::listener(), log.clone()),
            vec!["base".into()],
        );

        let orch = orchestrator(repo);
        orch.handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
            .await;
        // arrival order is the reverse of dependency order
        orch.handle_node_event(load_event("web")).await;
        orch.handle_node_event(load_event("base")).await;
        assert!(log.lock().unwrap().is_empty());

        let report = orch
            .handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
            .await
            .unwrap();

        assert!(report.initial_load);
        assert_eq!(report.started, vec!["base", "web"]);
        assert_eq!(report.finished, vec!["web"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["base:start", "web:start", "web:finish"]
        );
    }

    #[tokio::test]
    async fn test_finish_waits_for_all_first_phase_starts() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(Probe::new("l1", Capabilities::listener(), log.clone()), vec![]);
        repo.insert(Probe::new("l2", Capabilities::listener(), log.clone()), vec![]);

        let orch = orchestrator(repo);
        orch.handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
            .await;
        orch.handle_node_event(load_event("l1")).await;
        orch.handle_node_event(load_event("l2")).await;
        orch.handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
            .await;

        let calls = log.lock().unwrap().clone();
        let first_finish = calls.iter().position(|c| c.ends_with(":finish")).unwrap();
        let last_start = calls.iter().rposition(|c| c.ends_with(":start")).unwrap();
        assert!(last_start < first_finish);
    }

    #[tokio::test]
    async fn test_batch_dedup_keeps_last_event_per_node() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        let probe = Probe::new("dup", Capabilities::service(), log.clone());
        probe.started.store(true, Ordering::SeqCst);
        repo.insert(probe, vec![]);

        let orch = orchestrator(repo);
        orch.handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
            .await;
        // the unload is superseded by the reload that follows it
        orch.handle_node_event(LifecycleEvent::new("dup", LifecycleKind::Unload, false))
            .await;
        orch.handle_node_event(LifecycleEvent::new("dup", LifecycleKind::Reload, true))
            .await;
        let report = orch
            .handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
            .await
            .unwrap();

        assert!(report.stopped.is_empty());
        assert!(!log.lock().unwrap().contains(&"dup:stop".to_string()));
    }

    #[tokio::test]
    async fn test_start_failure_is_recorded_and_batch_continues() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(
            Arc::new(Probe {
                id: "broken",
                caps: Capabilities::service(),
                phase: StartPhase::Early,
                started: AtomicBool::new(false),
                fail_start: true,
                log: log.clone(),
            }),
            vec![],
        );
        repo.insert(Probe::new("fine", Capabilities::service(), log.clone()), vec![]);

        let orch = orchestrator(repo.clone());
        orch.handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
            .await;
        orch.handle_node_event(load_event("broken")).await;
        orch.handle_node_event(load_event("fine")).await;
        let report = orch
            .handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
            .await
            .unwrap();

        assert_eq!(report.started, vec!["fine"]);
        let failures: Vec<_> = repo
            .messages()
            .into_iter()
            .filter(|m| m.error.is_some())
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].artifact_id, "broken");
        assert_eq!(failures[0].operation, "start");
    }

    #[tokio::test]
    async fn test_disable_startup_skips_artifacts_but_runs_eager() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(Probe::new("svc", Capabilities::service(), log.clone()), vec![]);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        repo.insert_service(
            "svc",
            ServiceFn::arc(move |_| {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(Some(json!({})))
                }
            }),
        );
        repo.set_eager("svc", true);

        let mut config = RuntimeConfig::new("alpha", "main");
        config.disable_startup = true;
        let orch = LifecycleOrchestrator::new(repo, config);
        orch.handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
            .await;
        orch.handle_node_event(load_event("svc")).await;
        let report = orch
            .handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
            .await
            .unwrap();

        assert!(report.started.is_empty());
        assert!(log.lock().unwrap().is_empty());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unload_halts_then_stops_dependents_first() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        let base = Probe::new("base", Capabilities::listener(), log.clone());
        let child = Probe::new("child", Capabilities::listener(), log.clone());
        base.started.store(true, Ordering::SeqCst);
        child.started.store(true, Ordering::SeqCst);
        repo.insert(base, vec![]);
        repo.insert(child, vec!["base".into()]);

        let orch = orchestrator(repo);
        orch.handle_node_event(LifecycleEvent::new("base", LifecycleKind::Unload, false))
            .await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["child:halt", "child:stop", "base:halt", "base:stop"]
        );
    }

    #[tokio::test]
    async fn test_unload_of_a_circular_pair_stops_each_node_once() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        let a = Probe::new("a", Capabilities::service(), log.clone());
        let b = Probe::new("b", Capabilities::service(), log.clone());
        a.started.store(true, Ordering::SeqCst);
        b.started.store(true, Ordering::SeqCst);
        repo.insert(a, vec!["b".into()]);
        repo.insert(b, vec!["a".into()]);

        let orch = orchestrator(repo);
        orch.handle_node_event(LifecycleEvent::new("a", LifecycleKind::Unload, false))
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["b:stop", "a:stop"]);
    }

    #[tokio::test]
    async fn test_admin_start_of_a_circular_pair_starts_each_node_once() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(Probe::new("a", Capabilities::service(), log.clone()), vec!["b".into()]);
        repo.insert(Probe::new("b", Capabilities::service(), log.clone()), vec!["a".into()]);

        let orch = orchestrator(repo);
        orch.start("a").await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a:start", "b:start"]);
    }

    #[tokio::test]
    async fn test_eager_node_runs_service_instead_of_start() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(Probe::new("svc", Capabilities::service(), log.clone()), vec![]);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        repo.insert_service(
            "svc",
            ServiceFn::arc(move |_| {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(None)
                }
            }),
        );
        repo.set_eager("svc", true);

        let orch = orchestrator(repo);
        orch.handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
            .await;
        orch.handle_node_event(load_event("svc")).await;
        let report = orch
            .handle_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
            .await
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
        assert!(report.started.is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_restart_recurses_dependents() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        let mut caps = Capabilities::service();
        caps.restartable = true;
        let base = Probe::new("base", caps, log.clone());
        let child = Probe::new("child", caps, log.clone());
        base.started.store(true, Ordering::SeqCst);
        child.started.store(true, Ordering::SeqCst);
        repo.insert(base, vec![]);
        repo.insert(child, vec!["base".into()]);

        let orch = orchestrator(repo);
        orch.restart("base").await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["base:restart", "child:restart"]);
    }

    #[tokio::test]
    async fn test_admin_ops_reject_unknown_nodes_and_shutdown() {
        let repo = Arc::new(MemoryRepository::new());
        let orch = orchestrator(repo);

        let err = orch.start("ghost").await.unwrap_err();
        assert_eq!(err.as_label(), "unknown_node");

        orch.shutdown().await;
        let err = orch.start("ghost").await.unwrap_err();
        assert_eq!(err.as_label(), "shutting_down");
    }

    #[tokio::test]
    async fn test_shutdown_halts_everything_before_stopping() {
        let log: CallLog = Arc::default();
        let repo = Arc::new(MemoryRepository::new());
        let l1 = Probe::new("l1", Capabilities::listener(), log.clone());
        let l2 = Probe::new("l2", Capabilities::listener(), log.clone());
        l1.started.store(true, Ordering::SeqCst);
        l2.started.store(true, Ordering::SeqCst);
        repo.insert(l1, vec![]);
        repo.insert(l2, vec![]);

        let orch = orchestrator(repo);
        orch.shutdown().await;

        let calls = log.lock().unwrap().clone();
        let last_halt = calls.iter().rposition(|c| c.ends_with(":halt")).unwrap();
        let first_stop = calls.iter().position(|c| c.ends_with(":stop")).unwrap();
        assert!(last_halt < first_stop);
    }
}
