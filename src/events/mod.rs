//! Runtime events: severity model and the structured event record.
//!
//! This module groups the event **data model** used by the runtime to report
//! on itself: member join/leave, server startup, and anything the hosted
//! artifacts want to surface. Events flow into the per-consumer drain
//! workers (see [`crate::drain`]) and, for rare urgent severities, straight
//! through to the consumer on the priority fast path.
//!
//! ## Contents
//! - [`Severity`] ordered severity scale with a configurable threshold
//! - [`RuntimeEvent`] the structured event payload with builder methods
//! - [`EventSink`] the seam through which producers fire events

mod event;
mod severity;

pub use event::{EventSink, RuntimeEvent};
pub use severity::Severity;
