//! Host-facing notifications.
//!
//! The pipeline produces a handful of user-visible, single-line messages
//! (dependency problems, loss of the synthesis worker). They cross the host
//! boundary through [`NotificationSink`]; everything chattier stays in the
//! log.

use async_trait::async_trait;
use tracing::warn;

/// Receives user-visible one-liners from the speech pipeline.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: String);
}

/// Default sink: forwards to the log as a warning.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, message: String) {
        warn!(target: "speech", "{}", message);
    }
}
