//! Notification hooks fired after each processed reply.

use std::{
    future::Future,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use thiserror::Error;

/// Error raised by a notifiable.
#[derive(Debug, Error)]
#[error("Callback failed: {message}")]
pub struct CallbackError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CallbackError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error.
    #[must_use]
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

/// Something to notify after each reply of an execute call is processed.
///
/// Implement this trait to hook progress reporting into execution; plain
/// and async closures can be registered through [`FnNotifiable`] and
/// [`AsyncFnNotifiable`].
#[async_trait]
pub trait Notifiable: Send + Sync {
    async fn notify(&self) -> Result<(), CallbackError>;
}

/// Adapter for synchronous closures.
pub struct FnNotifiable<F>(pub F);

#[async_trait]
impl<F> Notifiable for FnNotifiable<F>
where
    F: Fn() -> Result<(), CallbackError> + Send + Sync + 'static,
{
    async fn notify(&self) -> Result<(), CallbackError> {
        (self.0)()
    }
}

/// Adapter for closures returning a future.
pub struct AsyncFnNotifiable<F>(pub F);

#[async_trait]
impl<F, Fut> Notifiable for AsyncFnNotifiable<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    async fn notify(&self) -> Result<(), CallbackError> {
        (self.0)().await
    }
}

/// Ordered, shareable list of notifiables.
///
/// Clones share the same list.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: Arc<RwLock<Vec<Arc<dyn Notifiable>>>>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notifiable; it runs after all earlier registrations.
    pub fn register(&self, notifiable: Arc<dyn Notifiable>) {
        self.callbacks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notifiable);
    }

    /// Number of registered notifiables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every notifiable in registration order, awaiting each.
    ///
    /// # Errors
    /// Returns the first `CallbackError`; later notifiables do not run.
    pub async fn notify(&self) -> Result<(), CallbackError> {
        let snapshot: Vec<Arc<dyn Notifiable>> = self
            .callbacks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        for callback in snapshot {
            callback.notify().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn test_notify_in_registration_order() {
        let registry = CallbackRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&calls);
        registry.register(Arc::new(FnNotifiable(move || {
            first.lock().unwrap().push("sync");
            Ok(())
        })));
        let second = Arc::clone(&calls);
        registry.register(Arc::new(AsyncFnNotifiable(move || {
            let calls = Arc::clone(&second);
            async move {
                tokio::task::yield_now().await;
                calls.lock().unwrap().push("async");
                Ok(())
            }
        })));

        registry.notify().await.unwrap();
        registry.notify().await.unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(*calls.lock().unwrap(), vec!["sync", "async", "sync", "async"]);
    }

    #[tokio::test]
    async fn test_error_stops_notification() {
        let registry = CallbackRegistry::new();
        let reached = Arc::new(Mutex::new(false));

        registry.register(Arc::new(FnNotifiable(|| Err(CallbackError::new("boom")))));
        let flag = Arc::clone(&reached);
        registry.register(Arc::new(FnNotifiable(move || {
            *flag.lock().unwrap() = true;
            Ok(())
        })));

        let err = registry.notify().await.unwrap_err();
        assert_eq!(err.to_string(), "Callback failed: boom");
        assert!(!*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_registrations() {
        let registry = CallbackRegistry::new();
        let clone = registry.clone();
        clone.register(Arc::new(FnNotifiable(|| Ok(()))));
        assert!(!registry.is_empty());
        assert!(registry.notify().await.is_ok());
    }

    #[test]
    fn test_error_from_source() {
        let io = std::io::Error::other("disk full");
        let err = CallbackError::from_source(io);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "Callback failed: disk full");
    }
}
