//! "Content ready" notifications.

pub mod dispatcher;
pub mod notifier;
pub mod webhook;

pub use dispatcher::{DispatcherStats, NotificationDispatcher, SweepReport, notification_data};
pub use notifier::{
    LogNotifier, NotificationTemplate, Notifier, NotifyError, RecordingNotifier, SentNotification,
};
pub use webhook::WebhookNotifier;
