use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use tracing::debug;
use watchpost::Notifier;

const TIMESTAMP_FORMAT: &str = "%a %-d %b %Y %H:%M:%S";

#[derive(Debug, Serialize)]
struct Message {
    text: String,
}

/// Posts notifications to a Slack incoming webhook
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook: String,
}

impl SlackNotifier {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), webhook: webhook.into() }
    }

    fn error_text(service_id: &str, summary: &str) -> String {
        format!(
            "{} an error occurred for service {}\n{}",
            Local::now().format(TIMESTAMP_FORMAT),
            service_id.to_uppercase(),
            summary
        )
    }

    fn resolved_text(service_id: &str) -> String {
        format!(
            "{} Service {} is back to normal operation!",
            Local::now().format(TIMESTAMP_FORMAT),
            service_id.to_uppercase()
        )
    }

    async fn post(&self, text: String) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.webhook)
            .json(&Message { text })
            .send()
            .await
            .context("slack webhook request failed")?
            .error_for_status()
            .context("slack webhook rejected the message")?;

        debug!("slack webhook response: {}", response.text().await.unwrap_or_default());
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_errors(&self, service_id: &str, summary: &str) -> anyhow::Result<()> {
        self.post(Self::error_text(service_id, summary)).await
    }

    async fn notify_resolved(&self, service_id: &str) -> anyhow::Result<()> {
        self.post(Self::resolved_text(service_id)).await
    }
}
