use async_trait::async_trait;
use serde_json::json;
use stakebridge_http::HttpClient;
use tracing::debug;

use crate::error::Result;

/// Fire-and-forget operator notification. Publish failures are the caller's
/// to log; they must never block processing.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, message: &str) -> Result<()>;
}

/// Posts alerts to a chat webhook as `{"message": ...}`.
pub struct WebhookSink {
    http: HttpClient,
    url: String,
}

impl WebhookSink {
    pub fn new(http: HttpClient, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn publish(&self, message: &str) -> Result<()> {
        self.http
            .post_ok(&self.url, &json!({ "message": message }))
            .await?;
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct NullSink;

#[async_trait]
impl AlertSink for NullSink {
    async fn publish(&self, message: &str) -> Result<()> {
        debug!("Alert sink not configured, dropping alert: {}", message);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn publish(&self, message: &str) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }
}
