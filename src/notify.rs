//! "Training requirements changed" alerts for learners demoted by a
//! content change. Delivery lives outside the engine; these sinks only hand
//! the alert over.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequirementsChanged {
    pub learner_ids: Vec<Uuid>,
    pub training_id: Uuid,
    pub training_title: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn requirements_changed(&self, alert: &RequirementsChanged) -> anyhow::Result<()>;
}

/// Writes alerts to the log only.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn requirements_changed(&self, alert: &RequirementsChanged) -> anyhow::Result<()> {
        tracing::info!(
            training_id = %alert.training_id,
            training_title = %alert.training_title,
            learners = alert.learner_ids.len(),
            "training requirements changed"
        );
        Ok(())
    }
}

/// POSTs alerts as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn requirements_changed(&self, alert: &RequirementsChanged) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!(training_id = %alert.training_id, url = %self.url, "alert delivered");
        Ok(())
    }
}
