//! # Service trait and function-backed implementation.
//!
//! A [`Service`] is an invokable unit hosted by the repository: it takes an
//! optional JSON input and produces an optional JSON output. The runtime
//! treats service payloads as opaque values; marshaling to and from the wire
//! (for cluster dispatch) happens at the dispatch boundary.
//!
//! [`ServiceFn`] wraps an async closure into a service, which is the common
//! way to define services in tests and demos. [`ServiceRunner`] is the seam
//! for runner artifacts (e.g. execution pools) that cluster task targets can
//! name to take over execution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServiceError;

/// Shared reference to a service.
pub type ServiceRef = Arc<dyn Service>;

/// # Invokable unit hosted by the repository.
///
/// Implementations should contain their own failures and report them as
/// [`ServiceError`]; the runtime never unwinds across a service call.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use stevedore::{Service, ServiceError};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Service for Echo {
///     async fn invoke(&self, input: Option<Value>) -> Result<Option<Value>, ServiceError> {
///         Ok(input)
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Executes the service with the given input.
    async fn invoke(&self, input: Option<Value>) -> Result<Option<Value>, ServiceError>;
}

type ServiceFuture = Pin<Box<dyn Future<Output = Result<Option<Value>, ServiceError>> + Send>>;

/// Function-backed [`Service`].
pub struct ServiceFn {
    f: Box<dyn Fn(Option<Value>) -> ServiceFuture + Send + Sync>,
}

impl ServiceFn {
    /// Wraps an async closure into a shared service reference.
    ///
    /// # Example
    /// ```
    /// use serde_json::json;
    /// use stevedore::ServiceFn;
    ///
    /// let svc = ServiceFn::arc(|_input| async move { Ok(Some(json!({"ok": true}))) });
    /// ```
    pub fn arc<F, Fut>(f: F) -> ServiceRef
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, ServiceError>> + Send + 'static,
    {
        Arc::new(Self {
            f: Box::new(move |input| Box::pin(f(input))),
        })
    }
}

#[async_trait]
impl Service for ServiceFn {
    async fn invoke(&self, input: Option<Value>) -> Result<Option<Value>, ServiceError> {
        (self.f)(input).await
    }
}

/// # Delegate-able execution target.
///
/// A cluster task can name a runner artifact as its target; the member that
/// picks the task up then hands execution to the runner instead of invoking
/// the service inline (used for execution pools and similar).
#[async_trait]
pub trait ServiceRunner: Send + Sync + 'static {
    /// Runs the given service with the given input.
    async fn run(
        &self,
        service: ServiceRef,
        input: Option<Value>,
    ) -> Result<Option<Value>, ServiceError>;
}
