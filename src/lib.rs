//! # stevedore
//!
//! Runtime core of a pluggable application server: artifact lifecycle
//! orchestration, distributed service dispatch, and backpressured draining
//! of events and metrics.
//!
//! ## Architecture
//! ```text
//! Repository (external) ──▶ Runtime
//!                             ├─ LifecycleOrchestrator
//!                             │    defers node events while (re)loading,
//!                             │    replays them in dependency/phase order,
//!                             │    two-phase start/stop, offline mode
//!                             ├─ ClusterDispatcher (when clustered)
//!                             │    queue "server.execute"  → one member
//!                             │    topic "server.execute"  → all members
//!                             │    topic "server.result"   → ResultFuture latches
//!                             │    topic "server.heartbeat"→ MemberState tracking
//!                             ├─ DrainGroup<RuntimeEvent>
//!                             │    per-consumer buffered workers, severity
//!                             │    filter, alert fast path, load shedding
//!                             └─ DrainGroup<MetricSnapshot>
//! ```
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use stevedore::{
//!     LifecycleEvent, LifecycleKind, MemoryRepository, RepositoryPhase,
//!     RepositoryPhaseKind, Runtime, RuntimeConfig, ServiceFn,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let repository = Arc::new(MemoryRepository::new());
//! repository.insert_service("echo", ServiceFn::arc(|input| async move { Ok(input) }));
//!
//! let runtime = Runtime::new(repository, RuntimeConfig::new("alpha", "main"));
//! runtime
//!     .on_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, false))
//!     .await;
//! runtime
//!     .on_node_event(LifecycleEvent::new("echo", LifecycleKind::Load, true))
//!     .await;
//! runtime
//!     .on_repository_phase(RepositoryPhase::new(RepositoryPhaseKind::Load, true))
//!     .await;
//!
//! let output = runtime.run("echo", Some(json!({"n": 1}))).await.unwrap();
//! assert_eq!(output, Some(json!({"n": 1})));
//! # }
//! ```

pub mod artifacts;
pub mod cluster;
pub mod config;
pub mod drain;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod runtime;
pub mod services;

pub use artifacts::{
    Artifact, ArtifactRef, Capabilities, MemoryRepository, Node, Repository, StartPhase,
    ValidationMessage,
};
pub use cluster::{
    Cluster, ClusterDispatcher, Heartbeat, LocalCluster, Member, MemberState, Membership,
    MembershipListener, ResultFuture, TaskEnvelope, TaskResult,
};
pub use config::{DrainConfig, RuntimeConfig};
pub use drain::{DrainConsumer, DrainError, DrainGroup, DrainItem, DrainWorker, ServiceConsumer};
pub use error::{RuntimeError, ServiceError};
pub use events::{EventSink, RuntimeEvent, Severity};
pub use lifecycle::{
    BatchReport, LifecycleEvent, LifecycleKind, LifecycleOrchestrator, RepositoryPhase,
    RepositoryPhaseKind,
};
pub use metrics::MetricSnapshot;
pub use runtime::Runtime;
pub use services::{Service, ServiceFn, ServiceRef, ServiceRunner};
