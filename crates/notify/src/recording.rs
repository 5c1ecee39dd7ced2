//! In-memory notifier for tests/dev.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::notification::Notification;
use crate::notifier::{Notifier, NotifyError};

/// Records every accepted notification. Can be switched into a failing mode to
/// exercise the `notified: false` path.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let n = Self::default();
        n.set_failing(true);
        n
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent notification of the given kind.
    pub fn last_of(&self, kind: &str) -> Option<Notification> {
        self.sent().into_iter().rev().find(|n| n.kind() == kind)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("recording notifier set to fail".into()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("recording notifier poisoned".into()))?;
        sent.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustgate_core::{Email, RequestId};

    fn rejected() -> Notification {
        Notification::PortalRejected {
            request_id: RequestId::new(),
            email: Email::parse("a@b.io").unwrap(),
        }
    }

    #[tokio::test]
    async fn records_in_order() {
        let n = RecordingNotifier::new();
        n.notify(rejected()).await.unwrap();
        n.notify(rejected()).await.unwrap();
        assert_eq!(n.sent().len(), 2);
        assert!(n.last_of("portal_rejected").is_some());
        assert!(n.last_of("portal_approved").is_none());
    }

    #[tokio::test]
    async fn failing_mode_records_nothing() {
        let n = RecordingNotifier::failing();
        assert!(n.notify(rejected()).await.is_err());
        assert!(n.sent().is_empty());

        n.set_failing(false);
        assert!(n.notify(rejected()).await.is_ok());
        assert_eq!(n.sent().len(), 1);
    }
}
