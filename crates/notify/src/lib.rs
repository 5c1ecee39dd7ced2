//! `trustgate-notify`: outbound notifications for request lifecycle changes.
//!
//! Delivery (email, chat, ...) is out of scope for the engine. Callers publish a
//! [`Notification`] after their unit of work commits and only learn whether the
//! notifier accepted it.

pub mod notification;
pub mod notifier;
pub mod recording;

pub use notification::{Audience, Notification};
pub use notifier::{Notifier, NotifyError, TracingNotifier};
pub use recording::RecordingNotifier;
