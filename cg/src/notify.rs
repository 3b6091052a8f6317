//! Desktop notifications
//!
//! Fire-and-forget: notification failures are logged and never propagate.
//! `notify-rust` shows notifications synchronously on some platforms, so
//! sends run on the blocking thread pool.

use tracing::{debug, warn};

use crate::storage::NotifyMode;

/// Notification channel honoring the workspace configuration
#[derive(Clone, Copy, Debug)]
pub struct Notifier {
    mode: NotifyMode,
}

impl Notifier {
    pub fn new(mode: NotifyMode) -> Self {
        Self { mode }
    }

    /// Send a desktop notification if a channel is configured
    pub fn notify(&self, title: &str, body: &str) {
        match self.mode {
            NotifyMode::None => {
                debug!(%title, "Notifier::notify: channel disabled, skipping");
            }
            NotifyMode::OsxNotification => {
                let title = title.to_string();
                let body = body.to_string();
                tokio::task::spawn_blocking(move || {
                    debug!(%title, "sending desktop notification");
                    if let Err(e) = notify_rust::Notification::new().summary(&title).body(&body).show() {
                        warn!(%title, error = %e, "desktop notification failed");
                    }
                });
            }
        }
    }
}
