//! # Repository seam.
//!
//! The artifact repository (dependency graph storage, resource storage, hot
//! reload detection) is an external collaborator; the runtime only consumes
//! the narrow [`Repository`] trait defined here. The repository pushes
//! lifecycle notifications into the runtime (see [`crate::lifecycle`]); the
//! runtime never polls it.

use crate::artifacts::{ArtifactRef, Capabilities};
use crate::services::{ServiceRef, ServiceRunner};
use std::sync::Arc;

/// The repository's holder for one artifact plus its load state.
///
/// A node is loaded iff its artifact reference is present.
#[derive(Clone)]
pub struct Node {
    /// Stable node id.
    pub id: String,
    /// Whether the node's service should be run eagerly (with empty input)
    /// on load/reload.
    pub eager: bool,
    /// The artifact, present while the node is loaded.
    pub artifact: Option<ArtifactRef>,
}

impl Node {
    /// Whether the node is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Non-fatal per-artifact report of a lifecycle operation.
///
/// Lifecycle failures are attached to the artifact as validation messages
/// instead of aborting the batch; `error: None` marks the operation clean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationMessage {
    /// The artifact the message concerns.
    pub artifact_id: String,
    /// The operation that produced the message (`start`, `stop`, ...).
    pub operation: &'static str,
    /// The failure, if the operation failed.
    pub error: Option<String>,
}

impl ValidationMessage {
    /// A clean report for a completed operation.
    pub fn ok(artifact_id: impl Into<String>, operation: &'static str) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            operation,
            error: None,
        }
    }

    /// A failure report.
    pub fn failed(
        artifact_id: impl Into<String>,
        operation: &'static str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            operation,
            error: Some(error.into()),
        }
    }
}

/// # Read surface of the artifact repository.
///
/// Lookups are in-memory and synchronous. Implementations must be safe to
/// call from any runtime task.
pub trait Repository: Send + Sync + 'static {
    /// Returns the latest version of a node, if it exists.
    fn node(&self, id: &str) -> Option<Node>;

    /// Resolves an artifact by id.
    fn resolve(&self, id: &str) -> Option<ArtifactRef>;

    /// Resolves a service by id.
    fn service(&self, id: &str) -> Option<ServiceRef>;

    /// Resolves a runner artifact by id (used for cluster task targets).
    fn runner(&self, id: &str) -> Option<Arc<dyn ServiceRunner>>;

    /// Direct outgoing references of a node (what it depends on).
    fn references(&self, id: &str) -> Vec<String>;

    /// Direct dependents of a node (what depends on it).
    fn dependents(&self, id: &str) -> Vec<String>;

    /// All loaded artifacts matching a capability filter, for the
    /// whole-repository offline/shutdown passes.
    fn artifacts_with(&self, filter: fn(&Capabilities) -> bool) -> Vec<ArtifactRef>;

    /// Records a non-fatal validation message against an artifact.
    fn record(&self, message: ValidationMessage);
}
