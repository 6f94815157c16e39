//! # Repository-service drain consumer.
//!
//! Deployed artifacts consume events and metrics by exposing a plain
//! service; [`ServiceConsumer`] adapts such a service into a
//! [`DrainConsumer`]. The service is resolved lazily on every delivery so a
//! hot reload swaps the implementation without touching the worker; a
//! service that is gone stops the worker.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::artifacts::Repository;
use crate::drain::consumer::{DrainConsumer, DrainError, DrainItem};

/// Drains batches into a repository service.
///
/// The batch arrives as `{"events": [...]}` or `{"metrics": [...]}`; the
/// service may answer with `{"handled": false}` to keep the batch buffered.
pub struct ServiceConsumer {
    service_id: String,
    payload_key: &'static str,
    repository: Arc<dyn Repository>,
}

impl ServiceConsumer {
    /// Adapter for an event-consuming service.
    pub fn events(service_id: impl Into<String>, repository: Arc<dyn Repository>) -> Arc<Self> {
        Arc::new(Self {
            service_id: service_id.into(),
            payload_key: "events",
            repository,
        })
    }

    /// Adapter for a metric-consuming service.
    pub fn metrics(service_id: impl Into<String>, repository: Arc<dyn Repository>) -> Arc<Self> {
        Arc::new(Self {
            service_id: service_id.into(),
            payload_key: "metrics",
            repository,
        })
    }
}

#[async_trait]
impl<T: DrainItem + Serialize> DrainConsumer<T> for ServiceConsumer {
    fn id(&self) -> &str {
        &self.service_id
    }

    async fn deliver(&self, batch: &[T]) -> Result<bool, DrainError> {
        let service =
            self.repository
                .service(&self.service_id)
                .ok_or_else(|| DrainError::Unavailable {
                    reason: format!("service not resolvable: {}", self.service_id),
                })?;
        let items = serde_json::to_value(batch).map_err(|err| DrainError::Unavailable {
            reason: format!("batch not serializable: {err}"),
        })?;
        let mut input = serde_json::Map::new();
        input.insert(self.payload_key.to_string(), items);

        let output = service.invoke(Some(Value::Object(input))).await?;
        let handled = output
            .as_ref()
            .and_then(|v| v.get("handled"))
            .and_then(Value::as_bool)
            // no answer means the batch was accepted
            .unwrap_or(true);
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::MemoryRepository;
    use crate::events::{RuntimeEvent, Severity};
    use crate::services::ServiceFn;
    use serde_json::json;
    use std::sync::Mutex;

    fn batch() -> Vec<RuntimeEvent> {
        vec![RuntimeEvent::new("A", Severity::Info), RuntimeEvent::new("B", Severity::Error)]
    }

    #[tokio::test]
    async fn test_batch_arrives_under_the_events_key() {
        let repo = Arc::new(MemoryRepository::new());
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        repo.insert_service(
            "audit",
            ServiceFn::arc(move |input| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = input;
                    Ok(None)
                }
            }),
        );

        let consumer = ServiceConsumer::events("audit", repo);
        let handled = consumer.deliver(&batch()).await.unwrap();
        assert!(handled);

        let input = seen.lock().unwrap().clone().unwrap();
        let events = input.get("events").unwrap().as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["code"], "A");
    }

    #[tokio::test]
    async fn test_handled_false_is_passed_through() {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert_service(
            "slow",
            ServiceFn::arc(|_| async move { Ok(Some(json!({"handled": false}))) }),
        );
        let consumer = ServiceConsumer::events("slow", repo);
        assert!(!consumer.deliver(&batch()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_service_is_unavailable() {
        let repo = Arc::new(MemoryRepository::new());
        let consumer = ServiceConsumer::events("ghost", repo);
        let err = consumer.deliver(&batch()).await.unwrap_err();
        assert!(matches!(err, DrainError::Unavailable { .. }));
    }
}
