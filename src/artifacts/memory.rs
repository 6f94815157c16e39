//! # In-memory repository.
//!
//! [`MemoryRepository`] backs the local (single-process) rendition of the
//! runtime and the test suite. It stores nodes, services, runners and the
//! reference graph in maps under one lock, and keeps every recorded
//! [`ValidationMessage`] for inspection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::artifacts::{ArtifactRef, Capabilities, Node, Repository, ValidationMessage};
use crate::services::{ServiceRef, ServiceRunner};

#[derive(Default)]
struct Graph {
    nodes: HashMap<String, Node>,
    references: HashMap<String, Vec<String>>,
    services: HashMap<String, ServiceRef>,
    runners: HashMap<String, Arc<dyn ServiceRunner>>,
}

/// In-memory [`Repository`] implementation.
#[derive(Default)]
pub struct MemoryRepository {
    graph: RwLock<Graph>,
    messages: Mutex<Vec<ValidationMessage>>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a loaded node holding the given artifact, with
    /// the given outgoing references.
    pub fn insert(&self, artifact: ArtifactRef, references: Vec<String>) {
        let id = artifact.id().to_string();
        let mut graph = self.graph.write().expect("repository lock poisoned");
        graph.nodes.insert(
            id.clone(),
            Node {
                id: id.clone(),
                eager: false,
                artifact: Some(artifact),
            },
        );
        graph.references.insert(id, references);
    }

    /// Inserts a service under the given id, creating a bare loaded node for
    /// it if none exists.
    pub fn insert_service(&self, id: impl Into<String>, service: ServiceRef) {
        let id = id.into();
        let mut graph = self.graph.write().expect("repository lock poisoned");
        graph.nodes.entry(id.clone()).or_insert_with(|| Node {
            id: id.clone(),
            eager: false,
            artifact: None,
        });
        graph.services.insert(id, service);
    }

    /// Registers a runner artifact under the given id.
    pub fn insert_runner(&self, id: impl Into<String>, runner: Arc<dyn ServiceRunner>) {
        let mut graph = self.graph.write().expect("repository lock poisoned");
        graph.runners.insert(id.into(), runner);
    }

    /// Marks a node's service as eager.
    pub fn set_eager(&self, id: &str, eager: bool) {
        let mut graph = self.graph.write().expect("repository lock poisoned");
        if let Some(node) = graph.nodes.get_mut(id) {
            node.eager = eager;
        }
    }

    /// Unloads a node: the node stays known but drops its artifact.
    pub fn unload(&self, id: &str) {
        let mut graph = self.graph.write().expect("repository lock poisoned");
        if let Some(node) = graph.nodes.get_mut(id) {
            node.artifact = None;
        }
    }

    /// Snapshot of the validation messages recorded so far.
    pub fn messages(&self) -> Vec<ValidationMessage> {
        self.messages.lock().expect("message lock poisoned").clone()
    }
}

impl Repository for MemoryRepository {
    fn node(&self, id: &str) -> Option<Node> {
        let graph = self.graph.read().expect("repository lock poisoned");
        graph.nodes.get(id).cloned()
    }

    fn resolve(&self, id: &str) -> Option<ArtifactRef> {
        let graph = self.graph.read().expect("repository lock poisoned");
        graph.nodes.get(id).and_then(|n| n.artifact.clone())
    }

    fn service(&self, id: &str) -> Option<ServiceRef> {
        let graph = self.graph.read().expect("repository lock poisoned");
        graph.services.get(id).cloned()
    }

    fn runner(&self, id: &str) -> Option<Arc<dyn ServiceRunner>> {
        let graph = self.graph.read().expect("repository lock poisoned");
        graph.runners.get(id).cloned()
    }

    fn references(&self, id: &str) -> Vec<String> {
        let graph = self.graph.read().expect("repository lock poisoned");
        graph.references.get(id).cloned().unwrap_or_default()
    }

    fn dependents(&self, id: &str) -> Vec<String> {
        let graph = self.graph.read().expect("repository lock poisoned");
        let mut out: Vec<String> = graph
            .references
            .iter()
            .filter(|(_, refs)| refs.iter().any(|r| r == id))
            .map(|(from, _)| from.clone())
            .collect();
        out.sort();
        out
    }

    fn artifacts_with(&self, filter: fn(&Capabilities) -> bool) -> Vec<ArtifactRef> {
        let graph = self.graph.read().expect("repository lock poisoned");
        let mut out: Vec<ArtifactRef> = graph
            .nodes
            .values()
            .filter_map(|n| n.artifact.clone())
            .filter(|a| filter(&a.capabilities()))
            .collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    fn record(&self, message: ValidationMessage) {
        self.messages
            .lock()
            .expect("message lock poisoned")
            .push(message);
    }
}
