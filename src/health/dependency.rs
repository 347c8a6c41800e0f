//! A named dependency whose readiness gates the process.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::BoxError;
use crate::health::readiness::ReadinessTracker;

/// Asynchronous action run when the process shuts down.
pub type ShutdownAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Box an async closure into a [`ShutdownAction`].
pub fn shutdown_action<F, Fut, E>(action: F) -> ShutdownAction
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    Arc::new(move || {
        let fut = action();
        async move { fut.await.map_err(Into::into) }.boxed()
    })
}

/// A named unit with a ready flag and an optional shutdown action.
///
/// Created only through [`DependencyRegistry::create`](crate::health::DependencyRegistry::create).
pub struct Dependency {
    name: String,
    ready: AtomicBool,
    action: Mutex<Option<ShutdownAction>>,
    readiness: Arc<ReadinessTracker>,
}

impl Dependency {
    pub(crate) fn new(name: String, readiness: Arc<ReadinessTracker>) -> Self {
        Self {
            name,
            ready: AtomicBool::new(false),
            action: Mutex::new(None),
            readiness,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Mark this dependency ready.
    ///
    /// Idempotent. Every call re-runs the aggregate readiness check.
    pub fn set_ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            self.readiness.dependency_ready();
            tracing::info!(dependency = %self.name, "Dependency ready");
        }
        self.readiness.check();
    }

    /// Store the action run during shutdown. A later call replaces it.
    ///
    /// Must not be called concurrently with the shutdown sequence.
    pub fn on_shutdown<F, Fut, E>(&self, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        *self.action.lock().expect("dependency action mutex poisoned") = Some(shutdown_action(action));
    }

    pub fn clear_shutdown(&self) {
        self.action.lock().expect("dependency action mutex poisoned").take();
    }

    pub fn has_shutdown_action(&self) -> bool {
        self.action.lock().expect("dependency action mutex poisoned").is_some()
    }

    /// Run the stored shutdown action, if any, and return its result.
    pub async fn shutdown(&self) -> Result<(), BoxError> {
        let action = self
            .action
            .lock()
            .expect("dependency action mutex poisoned")
            .clone();

        match action {
            Some(action) => action().await,
            None => {
                tracing::debug!(dependency = %self.name, "No shutdown action registered");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .field("has_shutdown_action", &self.has_shutdown_action())
            .finish()
    }
}
