//! # Cluster dispatch loops.
//!
//! [`ClusterDispatcher`] owns the runtime's side of the dispatch protocol:
//! it consumes the point-to-point execute queue, subscribes the execute,
//! result and heartbeat topics, publishes this member's heartbeat, and
//! tracks membership churn.
//!
//! ## Rules
//! - Execution never unwinds into the loops: every failure is folded into a
//!   [`TaskResult`] (when correlated) or logged (when fire-and-forget).
//! - A named target that is neither a local runner artifact nor one of our
//!   names is someone else's task and is dropped without a sound.
//! - Feedback drops a latch from the correlation map as soon as it is done,
//!   and sweeps registrations whose callers have gone away, so cancelled or
//!   timed-out runs do not pile up when their results never arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifacts::Repository;
use crate::cluster::member::{MemberState, HEARTBEAT_INTERVAL};
use crate::cluster::substrate::{Cluster, Member, MembershipListener};
use crate::cluster::task::{Heartbeat, TaskEnvelope, TaskResult};
use crate::cluster::{ResultFuture, EXECUTE_CHANNEL, HEARTBEAT_TOPIC, RESULT_TOPIC};
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, ServiceError};
use crate::events::{EventSink, RuntimeEvent, Severity};
use crate::services::ServiceRef;

/// Dispatches service executions across the cluster and tracks its members.
pub struct ClusterDispatcher {
    cluster: Arc<dyn Cluster>,
    repository: Arc<dyn Repository>,
    events: Arc<dyn EventSink>,
    name: String,
    group: String,
    aliases: Vec<String>,
    offline: Arc<AtomicBool>,
    futures: Mutex<HashMap<String, Weak<ResultFuture>>>,
    members: Mutex<HashMap<String, MemberState>>,
    cancel: CancellationToken,
}

impl ClusterDispatcher {
    /// Creates a dispatcher for this member.
    ///
    /// The offline flag is shared with the lifecycle orchestrator; it only
    /// tunes the severity of member-left events.
    pub fn new(
        cluster: Arc<dyn Cluster>,
        repository: Arc<dyn Repository>,
        events: Arc<dyn EventSink>,
        config: &RuntimeConfig,
        offline: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            repository,
            events,
            name: config.name.clone(),
            group: config.group.clone(),
            aliases: config.aliases.clone(),
            offline,
            futures: Mutex::new(HashMap::new()),
            members: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Starts the dispatch loops: queue consumer, topic subscriptions,
    /// membership listener, heartbeat publisher.
    pub fn start(self: &Arc<Self>) {
        let membership = self.cluster.membership();
        {
            let mut members = self.members.lock().expect("member lock poisoned");
            for member in membership.members() {
                members
                    .entry(member.key())
                    .or_insert_with(|| MemberState::new(member));
            }
        }
        membership.add_listener(Arc::new(MembershipBridge {
            dispatcher: Arc::downgrade(self),
        }));

        let this = Arc::downgrade(self);
        self.cluster.topic(EXECUTE_CHANNEL).subscribe(Arc::new(move |bytes| {
            let Some(this) = this.upgrade() else { return };
            match TaskEnvelope::from_bytes(&bytes) {
                Ok(envelope) => {
                    tokio::spawn(async move { this.execute(envelope).await });
                }
                Err(err) => warn!(error = %err, "dropping unparseable broadcast task"),
            }
        }));

        let this = Arc::downgrade(self);
        self.cluster.topic(RESULT_TOPIC).subscribe(Arc::new(move |bytes| {
            let Some(this) = this.upgrade() else { return };
            match TaskResult::from_bytes(&bytes) {
                Ok(result) => this.feedback(result),
                Err(err) => warn!(error = %err, "dropping unparseable task result"),
            }
        }));

        let this = Arc::downgrade(self);
        self.cluster.topic(HEARTBEAT_TOPIC).subscribe(Arc::new(move |bytes| {
            let Some(this) = this.upgrade() else { return };
            match Heartbeat::from_bytes(&bytes) {
                Ok(heartbeat) => this.heartbeat(heartbeat),
                Err(err) => warn!(error = %err, "dropping unparseable heartbeat"),
            }
        }));

        let this = self.clone();
        tokio::spawn(async move {
            let queue = this.cluster.queue(EXECUTE_CHANNEL);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    taken = queue.take() => match taken {
                        Some(bytes) => match TaskEnvelope::from_bytes(&bytes) {
                            Ok(envelope) => this.execute(envelope).await,
                            Err(err) => warn!(error = %err, "dropping unparseable queued task"),
                        },
                        None => break,
                    },
                }
            }
            debug!("execute queue consumer stopped");
        });

        let this = self.clone();
        tokio::spawn(async move {
            let topic = this.cluster.topic(HEARTBEAT_TOPIC);
            let beacon = Heartbeat {
                name: this.name.clone(),
                group: this.group.clone(),
            };
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                        match beacon.to_bytes() {
                            Ok(bytes) => {
                                if let Err(err) = topic.publish(bytes).await {
                                    warn!(error = %err, "heartbeat publish failed");
                                }
                            }
                            Err(err) => warn!(error = %err, "heartbeat marshal failed"),
                        }
                    }
                }
            }
        });

        info!(member = %self.cluster.member(), "cluster dispatcher started");
    }

    /// Stops the dispatch loops.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Hands a task to exactly one member via the execute queue.
    pub async fn run_anywhere(&self, envelope: &TaskEnvelope) -> Result<(), RuntimeError> {
        self.cluster
            .queue(EXECUTE_CHANNEL)
            .put(envelope.to_bytes()?)
            .await
    }

    /// Broadcasts a task to every member via the execute topic.
    pub async fn run_everywhere(&self, envelope: &TaskEnvelope) -> Result<(), RuntimeError> {
        self.cluster
            .topic(EXECUTE_CHANNEL)
            .publish(envelope.to_bytes()?)
            .await
    }

    /// Registers a latch under a fresh run id.
    ///
    /// The registration is weak: once the caller drops its latch, the next
    /// [`feedback`](Self::feedback) sweep releases the run id.
    pub fn expect_results(&self, expected: usize) -> (String, Arc<ResultFuture>) {
        let run_id = uuid::Uuid::new_v4().to_string();
        let future = Arc::new(ResultFuture::new(expected));
        self.futures
            .lock()
            .expect("future lock poisoned")
            .insert(run_id.clone(), Arc::downgrade(&future));
        (run_id, future)
    }

    /// Cancels and unregisters a latch that will not be waited on anymore.
    pub fn forget(&self, run_id: &str) {
        let removed = self
            .futures
            .lock()
            .expect("future lock poisoned")
            .remove(run_id);
        if let Some(future) = removed.and_then(|weak| weak.upgrade()) {
            future.cancel();
        }
    }

    /// Current cluster members as tracked by heartbeats and churn.
    pub fn members(&self) -> Vec<Member> {
        self.members
            .lock()
            .expect("member lock poisoned")
            .values()
            .map(|s| s.member.clone())
            .collect()
    }

    /// Members whose heartbeats have stalled.
    pub fn suspects(&self) -> Vec<Member> {
        let now = Instant::now();
        self.members
            .lock()
            .expect("member lock poisoned")
            .values()
            .filter(|s| s.is_suspect(now))
            .map(|s| s.member.clone())
            .collect()
    }

    /// Executes a task that reached this member.
    pub async fn execute(&self, envelope: TaskEnvelope) {
        if let Some(target) = envelope.target.as_deref() {
            if let Some(runner) = self.repository.runner(target) {
                let outcome = match self.resolve(&envelope) {
                    Ok((service, input)) => runner.run(service, input).await,
                    Err(err) => Err(err),
                };
                self.report(&envelope, outcome).await;
                return;
            }
            if !self.is_self(target) {
                debug!(target, service = %envelope.service_id, "task targets another member");
                return;
            }
        }
        let outcome = match self.resolve(&envelope) {
            Ok((service, input)) => service.invoke(input).await,
            Err(err) => Err(err),
        };
        self.report(&envelope, outcome).await;
    }

    fn is_self(&self, target: &str) -> bool {
        target == self.name || target == self.group || self.aliases.iter().any(|a| a == target)
    }

    fn resolve(
        &self,
        envelope: &TaskEnvelope,
    ) -> Result<(ServiceRef, Option<Value>), ServiceError> {
        let service = self
            .repository
            .service(&envelope.service_id)
            .ok_or_else(|| ServiceError::not_found(&envelope.service_id))?;
        let input = match envelope.input.as_deref() {
            Some(text) => Some(
                serde_json::from_str(text)
                    .map_err(|err| ServiceError::bad_payload(err.to_string()))?,
            ),
            None => None,
        };
        Ok((service, input))
    }

    /// Publishes a correlated outcome, or logs a fire-and-forget failure.
    async fn report(&self, envelope: &TaskEnvelope, outcome: Result<Option<Value>, ServiceError>) {
        let Some(run_id) = envelope.run_id.as_deref() else {
            if let Err(err) = outcome {
                warn!(service = %envelope.service_id, error = %err, "uncorrelated task failed");
            }
            return;
        };
        let target = self.cluster.member().key();
        let result = match outcome {
            Ok(output) => {
                let output = match output.map(|v| serde_json::to_string(&v)).transpose() {
                    Ok(text) => text,
                    Err(err) => {
                        let err = ServiceError::bad_payload(err.to_string());
                        let result =
                            TaskResult::failure(run_id, target, &envelope.service_id, &err);
                        self.publish_result(result).await;
                        return;
                    }
                };
                TaskResult::success(run_id, target, &envelope.service_id, output)
            }
            Err(err) => TaskResult::failure(run_id, target, &envelope.service_id, &err),
        };
        self.publish_result(result).await;
    }

    async fn publish_result(&self, result: TaskResult) {
        match result.to_bytes() {
            Ok(bytes) => {
                if let Err(err) = self.cluster.topic(RESULT_TOPIC).publish(bytes).await {
                    warn!(run_id = %result.run_id, error = %err, "result publish failed");
                }
            }
            Err(err) => warn!(run_id = %result.run_id, error = %err, "result marshal failed"),
        }
    }

    /// Routes a result into its latch; done and abandoned latches leave the
    /// map.
    pub fn feedback(&self, result: TaskResult) {
        let mut futures = self.futures.lock().expect("future lock poisoned");
        futures.retain(|_, weak| weak.strong_count() > 0);
        let Some(future) = futures.get(&result.run_id).and_then(Weak::upgrade) else {
            debug!(run_id = %result.run_id, "result without a registered latch");
            return;
        };
        if future.is_done() {
            debug!(run_id = %result.run_id, "dropping straggler result for a finished latch");
            futures.remove(&result.run_id);
            return;
        }
        let run_id = result.run_id.clone();
        future.add_result(result);
        if future.is_done() {
            futures.remove(&run_id);
        }
    }

    fn heartbeat(&self, heartbeat: Heartbeat) {
        let member = Member::new(heartbeat.name, heartbeat.group);
        let mut members = self.members.lock().expect("member lock poisoned");
        members
            .entry(member.key())
            .or_insert_with(|| MemberState::new(member))
            .beat(Instant::now());
    }

    fn member_joined(&self, member: &Member) {
        info!(member = %member, "member joined cluster");
        self.members
            .lock()
            .expect("member lock poisoned")
            .insert(member.key(), MemberState::new(member.clone()));
        let event = RuntimeEvent::new("MEMBER-JOINED", Severity::Info)
            .with_event_name("cluster-member-joined")
            .with_message(format!(
                "Member joined cluster: {} (group: {})",
                member.name, member.group
            ))
            .with_member(member.key());
        let events = self.events.clone();
        tokio::spawn(async move { events.fire(event).await });
    }

    fn member_left(&self, member: &Member) {
        warn!(member = %member, "member left cluster");
        self.members
            .lock()
            .expect("member lock poisoned")
            .remove(&member.key());
        // an offline server expects to lose its peers
        let severity = if self.offline.load(Ordering::SeqCst) {
            Severity::Warning
        } else {
            Severity::Error
        };
        let event = RuntimeEvent::new("MEMBER-LEFT", severity)
            .with_event_name("cluster-member-left")
            .with_message(format!(
                "Member left cluster: {} (group: {})",
                member.name, member.group
            ))
            .with_member(member.key());
        let events = self.events.clone();
        tokio::spawn(async move { events.fire(event).await });
    }
}

struct MembershipBridge {
    dispatcher: Weak<ClusterDispatcher>,
}

impl MembershipListener for MembershipBridge {
    fn member_joined(&self, member: &Member) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.member_joined(member);
        }
    }

    fn member_left(&self, member: &Member) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.member_left(member);
        }
    }
}
