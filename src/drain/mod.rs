//! # Backpressured drain workers for events and metrics.
//!
//! Producers must never block on observability. Everything fired at a drain
//! group is buffered per consumer and delivered in batches by a dedicated
//! worker; when a consumer cannot keep up, the oldest items are shed.
//!
//! ## Architecture
//! ```text
//! producer ── publish ──▶ DrainGroup<T>
//!                            ├─ DrainWorker (consumer "audit")
//!                            ├─ DrainWorker (consumer "forwarder")
//!                            └─ ...
//!
//! DrainWorker::submit
//!   ├─ severity below threshold ──▶ dropped
//!   ├─ severity at/above priority ─▶ synchronous delivery (error surfaces)
//!   └─ else ──▶ buffer
//!        ├─ over busy threshold ──▶ early wake (cooldown-limited)
//!        └─ over capacity ────────▶ oldest item evicted
//!
//! worker loop: sleep(poll) or wake ─▶ snapshot ─▶ deliver
//!   ├─ Ok(handled)  ─▶ remove batch
//!   ├─ Ok(!handled) ─▶ retain batch
//!   ├─ Err(service) ─▶ drop batch (skip_on_error) or stop (strict)
//!   └─ Err(unavailable) ─▶ stop
//! ```
//!
//! ## Rules
//! - Buffered submission never waits on the consumer.
//! - Items within one worker are delivered oldest-first; ordering across the
//!   priority fast path and the buffered path is not guaranteed.
//! - A stopped worker is pruned from its group on the next publish.

mod consumer;
mod group;
mod service;
mod worker;

pub use consumer::{DrainConsumer, DrainError, DrainItem};
pub use group::DrainGroup;
pub use service::ServiceConsumer;
pub use worker::DrainWorker;
