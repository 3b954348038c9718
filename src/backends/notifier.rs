//! Notification backend
//!
//! The advisor only builds message payloads and channel lists; delivery is
//! someone else's problem and no guarantee is assumed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::AdvisorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub level: NotificationLevel,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(
        &self,
        message: &NotificationMessage,
        channels: &[String],
    ) -> AdvisorResult<()>;
}

/// Default notifier: writes through `tracing`. Useful in tests and for
/// embedders that route notifications off the log stream.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(
        &self,
        message: &NotificationMessage,
        channels: &[String],
    ) -> AdvisorResult<()> {
        match message.level {
            NotificationLevel::Critical => {
                tracing::error!(channels = ?channels, "{}: {}", message.title, message.body)
            },
            NotificationLevel::Warning => {
                tracing::warn!(channels = ?channels, "{}: {}", message.title, message.body)
            },
            NotificationLevel::Info => {
                tracing::info!(channels = ?channels, "{}: {}", message.title, message.body)
            },
        }
        Ok(())
    }
}
