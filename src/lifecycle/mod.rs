//! # Artifact lifecycle orchestration.
//!
//! This module reacts to the repository's push notifications and drives
//! artifact start/stop/restart/finish calls in dependency order.
//!
//! ## Architecture
//! ```text
//! Repository (external)
//!   │
//!   ├─ LifecycleEvent{node, LOAD/RELOAD/UNLOAD, done}
//!   │        │
//!   │        ▼
//!   │  LifecycleOrchestrator::handle_node_event
//!   │        ├─ repository loading? → defer into the phase batch
//!   │        ├─ LOAD/RELOAD done    → start / restart (recursing dependents)
//!   │        └─ UNLOAD/RELOAD !done → halt-then-stop (recursing dependents)
//!   │
//!   └─ RepositoryPhase{LOAD/RELOAD, done}
//!            │
//!            ▼
//!      handle_repository_phase
//!            ├─ !done → loading: clear and begin a new deferred batch
//!            └─ done  → dedup batch by node id, order by dependency+phase,
//!                       process entries (eager run / restart / start),
//!                       then finish() every two-phase artifact collected
//! ```
//!
//! ## Rules
//! - Ordering is a fixed-point bubble pass: dependency precedence first,
//!   startup phase as the tie-breaker, cycle pairs warned and left in place.
//! - Two-phase gating: no `finish()` runs before every first-phase start in
//!   the batch has returned (success or logged failure).
//! - Lifecycle failures are caught per artifact, logged, recorded as
//!   validation messages, and never abort the batch.
//! - The orchestrator runs synchronously on the event-delivery path; it is
//!   the only caller of lifecycle methods, so no artifact sees two
//!   concurrent transitions.

mod event;
mod orchestrator;
mod order;

pub use event::{LifecycleEvent, LifecycleKind, RepositoryPhase, RepositoryPhaseKind};
pub use orchestrator::{BatchReport, LifecycleOrchestrator};
