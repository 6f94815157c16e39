//! # Service abstractions.
//!
//! This module provides the service-side seams of the runtime:
//! - [`Service`] - trait for invokable units hosted by the repository
//! - [`ServiceFn`] - function-backed service implementation
//! - [`ServiceRef`] - shared reference to a service (`Arc<dyn Service>`)
//! - [`ServiceRunner`] - trait for delegate-able runner artifacts

mod service;

pub use service::{Service, ServiceFn, ServiceRef, ServiceRunner};
