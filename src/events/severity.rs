//! # Event severity scale.
//!
//! [`Severity`] orders events from chatty diagnostics to urgent alerts. The
//! drain workers use it twice: events below a configured threshold are not
//! buffered at all, and events at or above a configured priority severity
//! bypass buffering entirely.

use serde::{Deserialize, Serialize};

/// Ordered severity of a [`RuntimeEvent`](crate::events::RuntimeEvent).
///
/// The derive order is the ordinal order: `Trace < Debug < ... < Alert`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Fine-grained diagnostics.
    Trace,
    /// Development diagnostics.
    Debug,
    /// Normal operational events.
    #[default]
    Info,
    /// Something unexpected that the runtime absorbed.
    Warning,
    /// A failure that affected an operation.
    Error,
    /// A failure that affects the member as a whole.
    Critical,
    /// Urgent; delivered on the priority fast path by default.
    Alert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::Alert);
    }

    #[test]
    fn test_severity_wire_names() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
