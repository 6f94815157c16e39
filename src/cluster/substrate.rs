//! # Cluster substrate seam.
//!
//! The actual cluster technology (discovery, transport, replication) is an
//! external collaborator; the runtime consumes it through the narrow traits
//! here. Payloads are opaque byte vectors; everything the runtime sends is
//! JSON produced in [`task`](crate::cluster::task).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RuntimeError;

/// Identity of one cluster member.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Member {
    /// Member name, unique within the group.
    pub name: String,
    /// Group the member belongs to.
    pub group: String,
}

impl Member {
    /// Creates a member identity.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Stable `name@group` key used in maps and event records.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.group)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.group)
    }
}

/// Point-to-point queue: a payload put by one member is taken by exactly one
/// member.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueues a payload.
    async fn put(&self, payload: Vec<u8>) -> Result<(), RuntimeError>;

    /// Takes the next payload, waiting for one to arrive.
    ///
    /// Returns `None` once the queue is closed.
    async fn take(&self) -> Option<Vec<u8>>;
}

/// Callback invoked with every payload published on a subscribed topic.
pub type MessageListener = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Broadcast topic: a published payload reaches every subscriber, including
/// the publisher's own.
#[async_trait]
pub trait Topic: Send + Sync {
    /// Publishes a payload to all subscribers.
    async fn publish(&self, payload: Vec<u8>) -> Result<(), RuntimeError>;

    /// Registers a listener; listeners must not block.
    fn subscribe(&self, listener: MessageListener);
}

/// Membership change callbacks.
pub trait MembershipListener: Send + Sync {
    /// A member joined the cluster.
    fn member_joined(&self, member: &Member);

    /// A member left the cluster.
    fn member_left(&self, member: &Member);
}

/// Membership view of the cluster.
pub trait Membership: Send + Sync {
    /// Current members, including this one.
    fn members(&self) -> Vec<Member>;

    /// Registers a membership listener.
    fn add_listener(&self, listener: Arc<dyn MembershipListener>);
}

/// # Handle on the cluster substrate.
///
/// Hands out named queues and topics; repeated lookups of the same name
/// return handles on the same underlying channel.
pub trait Cluster: Send + Sync + 'static {
    /// This member's identity.
    fn member(&self) -> Member;

    /// A named point-to-point queue.
    fn queue(&self, name: &str) -> Arc<dyn WorkQueue>;

    /// A named broadcast topic.
    fn topic(&self, name: &str) -> Arc<dyn Topic>;

    /// The membership view.
    fn membership(&self) -> Arc<dyn Membership>;
}
