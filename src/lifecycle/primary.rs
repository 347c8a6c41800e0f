//! The primary serving component.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};

use crate::error::BoxError;

/// The main serving surface of the process.
///
/// `terminate` should:
/// 1. Stop accepting new work
/// 2. Wait for in-flight work, up to `graceful_timeout`
/// 3. Forcibly close whatever is left at that bound
///
/// A failure is reported as `Err`; the shutdown sequence logs it and moves on
/// to the dependencies.
#[async_trait]
pub trait PrimaryComponent: Send + Sync {
    /// Returns the component name for logging purposes.
    fn name(&self) -> &str {
        "primary"
    }

    async fn terminate(&self, graceful_timeout: Duration) -> Result<(), BoxError>;
}

type TerminateFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A closure-backed primary component.
pub struct FnPrimary {
    name: String,
    terminate_fn: TerminateFn,
}

impl FnPrimary {
    pub fn new<F, Fut, E>(name: impl Into<String>, terminate_fn: F) -> Self
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            name: name.into(),
            terminate_fn: Arc::new(move |graceful| {
                let fut = terminate_fn(graceful);
                async move { fut.await.map_err(Into::into) }.boxed()
            }),
        }
    }
}

#[async_trait]
impl PrimaryComponent for FnPrimary {
    fn name(&self) -> &str {
        &self.name
    }

    async fn terminate(&self, graceful_timeout: Duration) -> Result<(), BoxError> {
        (self.terminate_fn)(graceful_timeout).await
    }
}

impl std::fmt::Debug for FnPrimary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPrimary").field("name", &self.name).finish()
    }
}
