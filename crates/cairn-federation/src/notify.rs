//! Administrator notifications.

use parking_lot::Mutex;
use tracing::info;

/// Delivers messages to the instance administrators.
pub trait NotificationSink: Send + Sync {
    /// Sends `message` with `subject` to every administrator.
    fn notify_administrators(&self, subject: &str, message: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify_administrators(&self, subject: &str, message: &str) {
        info!(subject = %subject, "{}", message);
    }
}

/// Keeps notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    /// Creates an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(subject, message)` sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

impl NotificationSink for MemoryNotifier {
    fn notify_administrators(&self, subject: &str, message: &str) {
        self.sent.lock().push((subject.to_string(), message.to_string()));
    }
}
