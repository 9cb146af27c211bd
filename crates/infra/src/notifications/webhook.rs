//! HTTP webhook delivery: one JSON POST per notification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use celestia_core::OwnerId;

use super::notifier::{NotificationTemplate, Notifier, NotifyError};

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    owner: &'a str,
    template: NotificationTemplate,
    data: &'a serde_json::Value,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, data), fields(owner = %owner, template = %template), err)]
    async fn send(
        &self,
        owner: &OwnerId,
        template: NotificationTemplate,
        data: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let body = WebhookBody {
            owner: owner.as_str(),
            template,
            data,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(status = %status, "webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_shape() {
        let owner = OwnerId::parse("a@example.com").unwrap();
        let data = serde_json::json!({"artifactId": "x"});
        let body = WebhookBody {
            owner: owner.as_str(),
            template: NotificationTemplate::ContentReady,
            data: &data,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "owner": "a@example.com",
                "template": "content_ready",
                "data": {"artifactId": "x"}
            })
        );
    }
}
