//! # Cluster substrate and distributed service dispatch.
//!
//! Service execution can be handed to the cluster in two shapes: a work
//! queue delivers a task to exactly one member (point-to-point), a topic
//! delivers it to every member (broadcast). Results travel back on their
//! own topic and are correlated by run id through [`ResultFuture`] latches.
//!
//! ## Architecture
//! ```text
//! caller ── run_anywhere ──▶ queue "server.execute" ──▶ one member
//!        ── run_everywhere ─▶ topic "server.execute" ──▶ all members
//!                                        │
//!                                        ▼
//!                            ClusterDispatcher::execute
//!                              ├─ target = runner artifact → delegate
//!                              ├─ target = us (name/group/alias) → local run
//!                              ├─ no target → local run
//!                              └─ foreign target → ignore
//!                                        │ (run id present)
//!                                        ▼
//!                            topic "server.result" ──▶ feedback
//!                                        │
//!                                        ▼
//!                            ResultFuture latch per run id
//! ```
//!
//! ## Rules
//! - Remote failures never propagate as errors: they travel inside the
//!   [`TaskResult`] error fields and the caller inspects them.
//! - A broadcast task with a foreign named target is dropped silently by
//!   non-matching members.
//! - Member join/leave and heartbeats feed [`MemberState`] tracking; leave
//!   while the server is offline is reported at warning severity only.
//!
//! The wire substrate itself (discovery, transport) lives behind the
//! [`Cluster`] trait; [`LocalCluster`] is the in-process rendition used by
//! unclustered servers and the test suite.

mod dispatcher;
mod future;
mod local;
mod member;
mod substrate;
mod task;

pub use dispatcher::ClusterDispatcher;
pub use future::ResultFuture;
pub use local::LocalCluster;
pub use member::{MemberState, RollingStats, HEARTBEAT_INTERVAL, MISSED_BEATS, STATS_WINDOW};
pub use substrate::{
    Cluster, Member, Membership, MembershipListener, MessageListener, Topic, WorkQueue,
};
pub use task::{Heartbeat, TaskEnvelope, TaskResult};

/// Name of the point-to-point execution queue and the broadcast execution
/// topic.
pub const EXECUTE_CHANNEL: &str = "server.execute";
/// Name of the result topic.
pub const RESULT_TOPIC: &str = "server.result";
/// Name of the heartbeat topic.
pub const HEARTBEAT_TOPIC: &str = "server.heartbeat";
