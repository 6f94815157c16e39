//! # In-process cluster substrate.
//!
//! [`LocalCluster`] backs the unclustered (single process) rendition of the
//! runtime: queues are tokio mpsc channels, topics fan a published payload
//! out to every registered listener, and the membership view contains only
//! this member. The dispatch paths behave identically whether the substrate
//! is local or a real cluster.
//!
//! Tests can feed membership churn through [`announce_join`](LocalCluster::announce_join)
//! and [`announce_leave`](LocalCluster::announce_leave).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cluster::substrate::{
    Cluster, Member, Membership, MembershipListener, MessageListener, Topic, WorkQueue,
};
use crate::error::RuntimeError;

struct LocalQueue {
    name: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

#[async_trait]
impl WorkQueue for LocalQueue {
    async fn put(&self, payload: Vec<u8>) -> Result<(), RuntimeError> {
        self.tx.send(payload).map_err(|_| RuntimeError::QueueClosed {
            name: self.name.clone(),
        })
    }

    async fn take(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.recv().await
    }
}

#[derive(Default)]
struct LocalTopic {
    listeners: Mutex<Vec<MessageListener>>,
}

#[async_trait]
impl Topic for LocalTopic {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), RuntimeError> {
        let listeners = self.listeners.lock().expect("topic lock poisoned").clone();
        for listener in listeners {
            listener(payload.clone());
        }
        Ok(())
    }

    fn subscribe(&self, listener: MessageListener) {
        self.listeners
            .lock()
            .expect("topic lock poisoned")
            .push(listener);
    }
}

struct LocalMembership {
    member: Member,
    listeners: Mutex<Vec<Arc<dyn MembershipListener>>>,
}

impl Membership for LocalMembership {
    fn members(&self) -> Vec<Member> {
        vec![self.member.clone()]
    }

    fn add_listener(&self, listener: Arc<dyn MembershipListener>) {
        self.listeners
            .lock()
            .expect("membership lock poisoned")
            .push(listener);
    }
}

/// Single-process [`Cluster`] implementation.
pub struct LocalCluster {
    member: Member,
    queues: Mutex<HashMap<String, Arc<LocalQueue>>>,
    topics: Mutex<HashMap<String, Arc<LocalTopic>>>,
    membership: Arc<LocalMembership>,
}

impl LocalCluster {
    /// Creates a local substrate for the given member identity.
    pub fn new(member: Member) -> Self {
        Self {
            membership: Arc::new(LocalMembership {
                member: member.clone(),
                listeners: Mutex::new(Vec::new()),
            }),
            member,
            queues: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Notifies registered membership listeners of a join.
    pub fn announce_join(&self, member: &Member) {
        let listeners = self
            .membership
            .listeners
            .lock()
            .expect("membership lock poisoned")
            .clone();
        for listener in listeners {
            listener.member_joined(member);
        }
    }

    /// Notifies registered membership listeners of a leave.
    pub fn announce_leave(&self, member: &Member) {
        let listeners = self
            .membership
            .listeners
            .lock()
            .expect("membership lock poisoned")
            .clone();
        for listener in listeners {
            listener.member_left(member);
        }
    }
}

impl Cluster for LocalCluster {
    fn member(&self) -> Member {
        self.member.clone()
    }

    fn queue(&self, name: &str) -> Arc<dyn WorkQueue> {
        let mut queues = self.queues.lock().expect("queue lock poisoned");
        queues
            .entry(name.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Arc::new(LocalQueue {
                    name: name.to_string(),
                    tx,
                    rx: tokio::sync::Mutex::new(rx),
                })
            })
            .clone()
    }

    fn topic(&self, name: &str) -> Arc<dyn Topic> {
        let mut topics = self.topics.lock().expect("topic lock poisoned");
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LocalTopic::default()))
            .clone()
    }

    fn membership(&self) -> Arc<dyn Membership> {
        self.membership.clone()
    }
}
