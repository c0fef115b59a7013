use async_trait::async_trait;
use uuid::Uuid;

/// Contract consumed from the notification-delivery collaborator.
/// Fire-and-forget: no delivery guarantee is required by the core, so the
/// trait cannot fail.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, user_id: Uuid, title: &str, message: &str, action_url: Option<&str>);
}

/// Default sink: structured log lines only. Useful in development and as the
/// wiring fallback when no push provider is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, user_id: Uuid, title: &str, message: &str, action_url: Option<&str>) {
        tracing::info!(
            %user_id,
            title,
            message,
            action_url = action_url.unwrap_or("-"),
            "notification delivered"
        );
    }
}
