//! Notifier abstraction (mechanics only).
//!
//! - Invoked after the unit of work commits, never inside it
//! - Fire-and-forget: a failure is reported, not retried
//! - Implementations must not log token values

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::Notification;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification rejected: {0}")]
    Rejected(String),

    #[error("notification transport unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[async_trait]
impl<N> Notifier for std::sync::Arc<N>
where
    N: Notifier + ?Sized,
{
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        (**self).notify(notification).await
    }
}

/// Writes each notification as a structured log event. Default for local runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = notification.kind(),
            audience = ?notification.audience(),
            "notification published"
        );
        Ok(())
    }
}
