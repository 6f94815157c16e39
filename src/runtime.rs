//! # Runtime composition root.
//!
//! [`Runtime`] wires the pieces together: the repository seam, the
//! lifecycle orchestrator, the cluster dispatcher (when clustered) and the
//! two drain groups. It stays dormant until the repository reports its
//! first completed load; that moment starts the dispatch loops and the
//! drain workers and fires the startup event.
//!
//! ## Rules
//! - Cluster operations on an unclustered runtime fail with
//!   [`RuntimeError::NotClustered`].
//! - `run` is the local entry point: failures surface directly to the
//!   caller instead of traveling as task results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::info;

use crate::artifacts::Repository;
use crate::cluster::{Cluster, ClusterDispatcher, Member, ResultFuture, TaskEnvelope};
use crate::config::RuntimeConfig;
use crate::drain::{DrainConsumer, DrainGroup, ServiceConsumer};
use crate::error::{RuntimeError, ServiceError};
use crate::events::{EventSink, RuntimeEvent, Severity};
use crate::lifecycle::{BatchReport, LifecycleEvent, LifecycleOrchestrator, RepositoryPhase};
use crate::metrics::MetricSnapshot;

/// The runtime core of one server member.
pub struct Runtime {
    config: RuntimeConfig,
    repository: Arc<dyn Repository>,
    orchestrator: Arc<LifecycleOrchestrator>,
    events: Arc<DrainGroup<RuntimeEvent>>,
    metrics: Arc<DrainGroup<MetricSnapshot>>,
    dispatcher: Option<Arc<ClusterDispatcher>>,
    started: AtomicBool,
    booted_at: Instant,
}

impl Runtime {
    /// Creates an unclustered runtime over the given repository.
    pub fn new(repository: Arc<dyn Repository>, config: RuntimeConfig) -> Self {
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            repository.clone(),
            config.clone(),
        ));
        // alerts bypass the event buffers
        let events = Arc::new(DrainGroup::with_priority(config.drain, Severity::Alert));
        let metrics = Arc::new(DrainGroup::new(config.drain));
        Self {
            config,
            repository,
            orchestrator,
            events,
            metrics,
            dispatcher: None,
            started: AtomicBool::new(false),
            booted_at: Instant::now(),
        }
    }

    /// Attaches a cluster substrate; dispatch loops start on the first
    /// completed repository load.
    #[must_use]
    pub fn with_cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
        self.dispatcher = Some(ClusterDispatcher::new(
            cluster,
            self.repository.clone(),
            self.events.clone(),
            &self.config,
            self.orchestrator.offline_flag(),
        ));
        self
    }

    /// This member's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Whether the first repository load has completed.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether the server is offline.
    pub fn is_offline(&self) -> bool {
        self.orchestrator.is_offline()
    }

    /// Push feed: a node transitioned.
    pub async fn on_node_event(&self, event: LifecycleEvent) {
        self.orchestrator.handle_node_event(event).await;
    }

    /// Push feed: the repository started or finished (re)loading.
    ///
    /// The first completed load brings the runtime up: dispatcher loops,
    /// drain workers, startup event.
    pub async fn on_repository_phase(&self, phase: RepositoryPhase) -> Option<BatchReport> {
        let report = self.orchestrator.handle_repository_phase(phase).await?;
        if report.initial_load && !self.started.swap(true, Ordering::SeqCst) {
            if let Some(dispatcher) = &self.dispatcher {
                dispatcher.start();
            }
            self.events.start();
            self.metrics.start();
            let elapsed = self.booted_at.elapsed();
            info!(member = %self.config.name, elapsed = ?elapsed, "server started");
            self.events
                .fire(
                    RuntimeEvent::new("SERVER-STARTED", Severity::Info)
                        .with_event_name("server-started")
                        .with_message(format!("Server started in {elapsed:?}"))
                        .with_member(format!("{}@{}", self.config.name, self.config.group))
                        .with_duration(elapsed),
                )
                .await;
        }
        Some(report)
    }

    /// Runs a service locally; failures surface to the caller directly.
    pub async fn run(
        &self,
        service_id: &str,
        input: Option<Value>,
    ) -> Result<Option<Value>, ServiceError> {
        let service = self
            .repository
            .service(service_id)
            .ok_or_else(|| ServiceError::not_found(service_id))?;
        service.invoke(input).await
    }

    /// Hands a task to exactly one member, fire-and-forget.
    pub async fn run_anywhere(&self, envelope: TaskEnvelope) -> Result<(), RuntimeError> {
        self.dispatcher()?.run_anywhere(&envelope).await
    }

    /// Hands a task to exactly one member and returns the latch its single
    /// result will land in.
    pub async fn run_anywhere_tracked(
        &self,
        envelope: TaskEnvelope,
    ) -> Result<Arc<ResultFuture>, RuntimeError> {
        let dispatcher = self.dispatcher()?;
        let (run_id, future) = dispatcher.expect_results(1);
        dispatcher
            .run_anywhere(&envelope.with_run_id(run_id))
            .await?;
        Ok(future)
    }

    /// Broadcasts a task to every member, fire-and-forget.
    pub async fn run_everywhere(&self, envelope: TaskEnvelope) -> Result<(), RuntimeError> {
        self.dispatcher()?.run_everywhere(&envelope).await
    }

    /// Broadcasts a task and returns the latch expecting one result per
    /// current member.
    pub async fn run_everywhere_tracked(
        &self,
        envelope: TaskEnvelope,
    ) -> Result<Arc<ResultFuture>, RuntimeError> {
        let dispatcher = self.dispatcher()?;
        let expected = dispatcher.members().len().max(1);
        let (run_id, future) = dispatcher.expect_results(expected);
        dispatcher
            .run_everywhere(&envelope.with_run_id(run_id))
            .await?;
        Ok(future)
    }

    /// Current cluster members.
    pub fn members(&self) -> Result<Vec<Member>, RuntimeError> {
        Ok(self.dispatcher()?.members())
    }

    fn dispatcher(&self) -> Result<&Arc<ClusterDispatcher>, RuntimeError> {
        self.dispatcher.as_ref().ok_or(RuntimeError::NotClustered)
    }

    /// Fires an event into the event drain group.
    ///
    /// Only a priority fast-path rejection comes back as an error; buffered
    /// events are accepted unconditionally.
    pub async fn fire_event(&self, event: RuntimeEvent) -> Result<(), RuntimeError> {
        self.events.publish(event).await
    }

    /// Fires a metric snapshot into the metric drain group.
    pub async fn fire_metric(&self, metric: MetricSnapshot) -> Result<(), RuntimeError> {
        self.metrics.publish(metric).await
    }

    /// Adds an event consumer.
    pub fn add_event_consumer(&self, consumer: Arc<dyn DrainConsumer<RuntimeEvent>>) {
        self.events.add(consumer);
    }

    /// Adds a metric consumer.
    pub fn add_metric_consumer(&self, consumer: Arc<dyn DrainConsumer<MetricSnapshot>>) {
        self.metrics.add(consumer);
    }

    /// Routes events into a repository service.
    pub fn add_event_service(&self, service_id: &str) {
        self.events
            .add(ServiceConsumer::events(service_id, self.repository.clone()));
    }

    /// Routes metrics into a repository service.
    pub fn add_metric_service(&self, service_id: &str) {
        self.metrics
            .add(ServiceConsumer::metrics(service_id, self.repository.clone()));
    }

    /// Starts an artifact and its dependents.
    pub async fn start_artifact(&self, id: &str) -> Result<(), RuntimeError> {
        self.orchestrator.start(id).await
    }

    /// Stops an artifact after its dependents.
    pub async fn stop_artifact(&self, id: &str) -> Result<(), RuntimeError> {
        self.orchestrator.stop(id).await
    }

    /// Restarts an artifact and its dependents.
    pub async fn restart_artifact(&self, id: &str) -> Result<(), RuntimeError> {
        self.orchestrator.restart(id).await
    }

    /// Takes the server offline.
    pub async fn bring_offline(&self) -> Result<(), RuntimeError> {
        self.orchestrator.bring_offline().await
    }

    /// Brings the server back online.
    pub async fn bring_online(&self) -> Result<(), RuntimeError> {
        self.orchestrator.bring_online().await
    }

    /// Shuts the runtime down: dispatch loops, drain workers, then every
    /// started artifact in reverse phase order.
    pub async fn shutdown(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.stop();
        }
        self.events.stop();
        self.metrics.stop();
        self.orchestrator.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::MemoryRepository;
    use crate::lifecycle::RepositoryPhaseKind;
    use crate::services::ServiceFn;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn fast_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::new("alpha", "main");
        config.drain.poll_interval = Duration::from_millis(10);
        config
    }

    async fn boot(runtime: &Runtime) {
        runtime
            .on_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
            .await;
        runtime
            .on_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
            .await;
    }

    #[tokio::test]
    async fn test_cluster_operations_require_a_cluster() {
        let runtime = Runtime::new(Arc::new(MemoryRepository::new()), fast_config());
        let err = runtime
            .run_anywhere(TaskEnvelope::new("svc"))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "not_clustered");
        assert_eq!(runtime.members().unwrap_err().as_label(), "not_clustered");
    }

    #[tokio::test]
    async fn test_local_run_surfaces_errors_directly() {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert_service("echo", ServiceFn::arc(|input| async move { Ok(input) }));
        let runtime = Runtime::new(repo, fast_config());

        let out = runtime.run("echo", Some(json!({"a": 1}))).await.unwrap();
        assert_eq!(out, Some(json!({"a": 1})));

        let err = runtime.run("ghost", None).await.unwrap_err();
        assert_eq!(err.code, "REMOTE-0");
    }

    #[tokio::test]
    async fn test_first_load_starts_runtime_and_fires_startup_event() {
        let repo = Arc::new(MemoryRepository::new());
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let sink = seen.clone();
        repo.insert_service(
            "audit",
            ServiceFn::arc(move |input| {
                let sink = sink.clone();
                async move {
                    if let Some(input) = input {
                        sink.lock().unwrap().push(input);
                    }
                    Ok(None)
                }
            }),
        );

        let runtime = Runtime::new(repo, fast_config());
        runtime.add_event_service("audit");
        assert!(!runtime.is_started());

        boot(&runtime).await;
        assert!(runtime.is_started());

        for _ in 0..200 {
            {
                let seen = seen.lock().unwrap();
                if seen
                    .iter()
                    .flat_map(|v| v["events"].as_array().cloned().unwrap_or_default())
                    .any(|e| e["code"] == "SERVER-STARTED")
                {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("startup event should reach the event consumer");
    }

    #[tokio::test]
    async fn test_second_reload_does_not_restart_the_runtime() {
        let runtime = Runtime::new(Arc::new(MemoryRepository::new()), fast_config());
        boot(&runtime).await;

        runtime
            .on_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Reload, false))
            .await;
        let report = runtime
            .on_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Reload, true))
            .await
            .unwrap();
        assert!(!report.initial_load);
    }
}
