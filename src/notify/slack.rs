use async_trait::async_trait;
use serde_json::Value;

use super::ChatWebhook;
use crate::error::{CodebuildError, Result};

/// Slack incoming webhook
#[derive(Clone)]
pub struct SlackWebhook {
    client: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl ChatWebhook for SlackWebhook {
    async fn post(&self, body: &Value) -> Result<u16> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| CodebuildError::Notify(format!("failed to post to Slack: {}", e)))?;
        Ok(response.status().as_u16())
    }
}
