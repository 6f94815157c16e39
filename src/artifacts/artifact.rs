//! # Artifact trait and capability flags.
//!
//! Every artifact carries a [`Capabilities`] set describing which lifecycle
//! operations it supports; the orchestrator only calls an operation when the
//! corresponding flag is set. The trait provides no-op defaults so an
//! implementor overrides exactly the operations its flags declare.
//!
//! ## Two-phase startup
//! An artifact with `two_phase_start` gets a [`finish`](Artifact::finish)
//! call after every first-phase start in the same batch has completed, so a
//! listener artifact is not made reachable until everything it depends on is
//! up. `two_phase_stop` mirrors this on the way down: the artifact is
//! [`halt`](Artifact::halt)ed before anything in the batch is stopped.
//!
//! ## Offline mode
//! Offlineable artifacts get the offline variants of start/stop when the
//! server-wide offline flag is set, plus [`online`](Artifact::online) /
//! [`offline`](Artifact::offline) transitions when the flag flips at runtime.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;

/// Shared reference to an artifact.
pub type ArtifactRef = Arc<dyn Artifact>;

/// Coarse startup ordering used as a tie-breaker between artifacts that have
/// no dependency relation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StartPhase {
    /// Starts before normal artifacts.
    Early,
    /// The default phase.
    #[default]
    Normal,
    /// Starts after normal artifacts (and stops before them).
    Late,
}

/// Lifecycle capability flags of an artifact.
///
/// Flags never change after construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Supports `start` / `is_started`.
    pub startable: bool,
    /// Supports `stop`.
    pub stoppable: bool,
    /// Supports `restart`.
    pub restartable: bool,
    /// Supports the post-start `finish` phase.
    pub two_phase_start: bool,
    /// Supports the pre-stop `halt` phase.
    pub two_phase_stop: bool,
    /// Supports offline variants and online/offline transitions.
    pub offlineable: bool,
    /// Supports the two-phase variants of the online/offline transitions.
    pub two_phase_offline: bool,
}

impl Capabilities {
    /// No capabilities at all.
    pub const NONE: Capabilities = Capabilities {
        startable: false,
        stoppable: false,
        restartable: false,
        two_phase_start: false,
        two_phase_stop: false,
        offlineable: false,
        two_phase_offline: false,
    };

    /// The common service shape: startable and stoppable.
    pub fn service() -> Self {
        Self {
            startable: true,
            stoppable: true,
            ..Self::NONE
        }
    }

    /// The common listener shape: startable, stoppable, two-phase on both
    /// ends.
    pub fn listener() -> Self {
        Self {
            startable: true,
            stoppable: true,
            two_phase_start: true,
            two_phase_stop: true,
            ..Self::NONE
        }
    }
}

/// # A deployable unit with lifecycle capabilities.
///
/// The orchestrator never calls two lifecycle methods on the same artifact
/// concurrently; artifacts manage their own internal concurrency.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use stevedore::{Artifact, Capabilities, ServiceError};
///
/// struct Connector {
///     started: AtomicBool,
/// }
///
/// #[async_trait]
/// impl Artifact for Connector {
///     fn id(&self) -> &str {
///         "demo.connector"
///     }
///
///     fn capabilities(&self) -> Capabilities {
///         Capabilities::service()
///     }
///
///     fn is_started(&self) -> bool {
///         self.started.load(Ordering::SeqCst)
///     }
///
///     async fn start(&self) -> Result<(), ServiceError> {
///         self.started.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<(), ServiceError> {
///         self.started.store(false, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Artifact: Send + Sync + 'static {
    /// Returns the stable artifact id, unique within the repository.
    fn id(&self) -> &str;

    /// Returns the startup phase used for coarse ordering.
    fn phase(&self) -> StartPhase {
        StartPhase::Normal
    }

    /// Returns the capability flags; these never change after construction.
    fn capabilities(&self) -> Capabilities;

    /// Whether the artifact is currently started.
    ///
    /// Artifacts without the `startable` capability are treated as started,
    /// so stop passes still reach them.
    fn is_started(&self) -> bool {
        true
    }

    /// Starts the artifact (first phase).
    async fn start(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Starts the artifact in offline mode.
    ///
    /// Called instead of [`start`](Self::start) when the server is offline
    /// and the artifact is offlineable.
    async fn start_offline(&self) -> Result<(), ServiceError> {
        self.start().await
    }

    /// Stops the artifact.
    async fn stop(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Restarts the artifact.
    async fn restart(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Pre-stop hook; called before [`stop`](Self::stop) when the artifact
    /// is two-phase stoppable, and before any batch sibling is stopped
    /// during shutdown.
    async fn halt(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Post-start second phase; called once every first-phase start in the
    /// batch has completed.
    async fn finish(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Brings the artifact online after a server-wide offline period.
    async fn online(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Takes the artifact offline.
    async fn offline(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Second phase of the online transition.
    async fn online_finish(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Second phase of the offline transition; also used instead of
    /// [`finish`](Self::finish) when starting while offline.
    async fn offline_finish(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
