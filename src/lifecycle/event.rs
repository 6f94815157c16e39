//! # Lifecycle notifications pushed by the repository.
//!
//! Two feeds arrive from the repository: per-node [`LifecycleEvent`]s and
//! repository-wide [`RepositoryPhase`] transitions. Both carry a `done`
//! flag: `false` means "about to happen", `true` means "has happened".
//!
//! LOAD/RELOAD node events are only actionable once done (the artifact is
//! resolvable then); UNLOAD is actionable while not done (the artifact is
//! still resolvable and can be shut down properly).

/// What happened to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleKind {
    /// The node was loaded for the first time.
    Load,
    /// The node was reloaded (hot reload).
    Reload,
    /// The node was unloaded.
    Unload,
}

/// A notification that a node transitioned.
#[derive(Clone, Debug)]
pub struct LifecycleEvent {
    /// The node the event concerns.
    pub node_id: String,
    /// The transition kind.
    pub kind: LifecycleKind,
    /// `false` = about to happen, `true` = has happened.
    pub done: bool,
}

impl LifecycleEvent {
    /// Creates an event.
    pub fn new(node_id: impl Into<String>, kind: LifecycleKind, done: bool) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            done,
        }
    }
}

/// What the repository as a whole is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryPhaseKind {
    /// Initial load.
    Load,
    /// Subsequent reload.
    Reload,
}

/// A repository-wide (re)load transition.
///
/// While a phase is in flight (`done == false` seen, completion not yet),
/// node events are queued instead of executed.
#[derive(Clone, Copy, Debug)]
pub struct RepositoryPhase {
    /// Load or reload.
    pub kind: RepositoryPhaseKind,
    /// `false` = loading started, `true` = loading finished.
    pub done: bool,
}

impl RepositoryPhase {
    /// Creates a phase notification.
    pub fn new(kind: RepositoryPhaseKind, done: bool) -> Self {
        Self { kind, done }
    }
}
