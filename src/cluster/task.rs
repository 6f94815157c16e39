//! # Wire records of the dispatch protocol.
//!
//! Everything that crosses the cluster is JSON: the task envelope going out,
//! the task result coming back, and the periodic heartbeat. Service input
//! and output are carried as pre-marshaled JSON text so intermediate members
//! never have to understand the payload.

use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, ServiceError};

/// A service execution request traveling across the cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// The service to execute.
    pub service_id: String,
    /// Marshaled service input, if any.
    pub input: Option<String>,
    /// Optional target: a member name, group, alias, or the id of a runner
    /// artifact on the receiving member. `None` means "whoever picks this
    /// up runs it".
    pub target: Option<String>,
    /// Correlation token; when present the executing member publishes a
    /// [`TaskResult`] under it.
    pub run_id: Option<String>,
}

impl TaskEnvelope {
    /// Creates an envelope for the given service with no input, target or
    /// correlation.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            input: None,
            target: None,
            run_id: None,
        }
    }

    /// Sets the marshaled input.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Sets the target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the correlation run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Serializes the envelope for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RuntimeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes an envelope from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The outcome of one member executing a [`TaskEnvelope`].
///
/// Failure travels in the error fields instead of failing the transport;
/// [`error`](TaskResult::error) reassembles it on the caller side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    /// Correlation token of the originating envelope.
    pub run_id: String,
    /// The member that executed the task (`name@group`).
    pub target: String,
    /// The executed service.
    pub service_id: String,
    /// Marshaled service output, if the execution succeeded and produced
    /// any.
    pub output: Option<String>,
    /// Stable error code, if the execution failed.
    pub error_code: Option<String>,
    /// Error description, if the execution failed.
    pub error_log: Option<String>,
}

impl TaskResult {
    /// A successful result.
    pub fn success(
        run_id: impl Into<String>,
        target: impl Into<String>,
        service_id: impl Into<String>,
        output: Option<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            target: target.into(),
            service_id: service_id.into(),
            output,
            error_code: None,
            error_log: None,
        }
    }

    /// A failed result carrying the error fields.
    pub fn failure(
        run_id: impl Into<String>,
        target: impl Into<String>,
        service_id: impl Into<String>,
        error: &ServiceError,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            target: target.into(),
            service_id: service_id.into(),
            output: None,
            error_code: Some(error.code.clone()),
            error_log: Some(error.message.clone()),
        }
    }

    /// Whether the execution failed.
    pub fn is_error(&self) -> bool {
        self.error_code.is_some() || self.error_log.is_some()
    }

    /// Reassembles the carried error, if any.
    pub fn error(&self) -> Option<ServiceError> {
        if !self.is_error() {
            return None;
        }
        Some(ServiceError::new(
            self.error_code.clone().unwrap_or_else(|| "REMOTE-1".into()),
            self.error_log.clone().unwrap_or_default(),
        ))
    }

    /// Serializes the result for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RuntimeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes a result from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Liveness beacon published periodically by every member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Member name.
    pub name: String,
    /// Member group.
    pub group: String,
}

impl Heartbeat {
    /// Serializes the heartbeat for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RuntimeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes a heartbeat from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_survives_the_wire() {
        let envelope = TaskEnvelope::new("crm.sync")
            .with_input(r#"{"n":1}"#)
            .with_target("beta")
            .with_run_id("run-1");
        let decoded = TaskEnvelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.service_id, "crm.sync");
        assert_eq!(decoded.target.as_deref(), Some("beta"));
        assert_eq!(decoded.run_id.as_deref(), Some("run-1"));
    }

    #[test]
    fn test_result_error_reassembly() {
        let err = ServiceError::remote("it broke");
        let result = TaskResult::failure("run-1", "beta@main", "crm.sync", &err);
        assert!(result.is_error());
        assert_eq!(result.error(), Some(err));

        let ok = TaskResult::success("run-1", "beta@main", "crm.sync", None);
        assert!(!ok.is_error());
        assert!(ok.error().is_none());
    }
}
