//! # Artifact capability model and the repository seam.
//!
//! An artifact is a deployable unit (service, connector, listener) with a
//! stable id and a subset of lifecycle capabilities. Rather than probing
//! concrete types at runtime, artifacts declare explicit [`Capabilities`]
//! flags and the orchestrator dispatches on capability presence.
//!
//! ## Contents
//! - [`Artifact`], [`Capabilities`], [`StartPhase`] capability model
//! - [`Node`], [`Repository`], [`ValidationMessage`] repository seam
//! - [`MemoryRepository`] in-memory implementation for the local
//!   (single-process) rendition and the test suite

mod artifact;
mod memory;
mod repository;

pub use artifact::{Artifact, ArtifactRef, Capabilities, StartPhase};
pub use memory::MemoryRepository;
pub use repository::{Node, Repository, ValidationMessage};
