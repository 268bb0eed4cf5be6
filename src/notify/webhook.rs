//! Discord-compatible webhook delivery.
//!
//! The webhook API maps one-to-one onto the artifact lifecycle: `POST
//! ?wait=true` creates a message and returns its id, `PATCH
//! /messages/{id}` edits it in place, `DELETE /messages/{id}` removes it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::notify::{Notification, Notifier};

/// Notifier delivering over webhook endpoints.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    /// Create a webhook notifier with its own short-timeout client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client })
    }

    /// Webhook URL asking for the created message back.
    fn post_url(channel: &str) -> Result<String> {
        let mut url = Url::parse(channel)?;
        url.query_pairs_mut().append_pair("wait", "true");
        Ok(url.to_string())
    }

    /// Webhook URL addressing an existing message.
    fn message_url(channel: &str, message_id: &str) -> Result<String> {
        let url = Url::parse(channel)?;
        Ok(format!("{}/messages/{message_id}", url.as_str().trim_end_matches('/')))
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        Err(AppError::notify(format!("{context} failed ({status}): {snippet}")))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn post(&self, channel: &str, note: &Notification) -> Result<String> {
        let response = self
            .client
            .post(Self::post_url(channel)?)
            .json(&note.to_json())
            .send()
            .await?;
        let response = Self::check(response, "webhook post").await?;

        let body: serde_json::Value = response.json().await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::notify("webhook post returned no message id"))
    }

    async fn edit(&self, channel: &str, message_id: &str, note: &Notification) -> Result<()> {
        let response = self
            .client
            .patch(Self::message_url(channel, message_id)?)
            .json(&note.to_json())
            .send()
            .await?;
        Self::check(response, "webhook edit").await?;
        Ok(())
    }

    async fn delete(&self, channel: &str, message_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(Self::message_url(channel, message_id)?)
            .send()
            .await?;
        Self::check(response, "webhook delete").await?;
        Ok(())
    }
}
