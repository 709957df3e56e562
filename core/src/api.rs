//! Request/response backend: message history, message creation, call
//! records, follow list and notifications.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{CallKind, Message, Notification, SenderRole, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn fetch_history(&self, chat_id: &str) -> Result<Vec<StoredMessage>>;
    async fn create_message(&self, draft: &NewMessage) -> Result<StoredMessage>;
    async fn record_call(&self, record: &CallRecord) -> Result<()>;
    async fn fetch_following(&self, user_id: &str) -> Result<Vec<User>>;
    async fn fetch_notifications(&self) -> Result<Vec<Notification>>;
}

/// Message as the backend stores it. Creation responses may carry only
/// `_id` and `createdAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "chatId", default)]
    pub chat_id: String,
    #[serde(rename = "senderId", default)]
    pub sender_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn into_message(self, local_user_id: &str) -> Message {
        Message {
            sender: SenderRole::of(&self.sender_id, local_user_id),
            id: self.id,
            text: self.text,
            timestamp: self.created_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub caller_id: String,
    pub receiver_id: String,
    pub call_type: CallKind,
}

// ============================================================================
// HTTP API Client
// ============================================================================

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.http_url(),
            token: Mutex::new(config.identity.token.clone()),
        })
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.lock().as_ref() {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().path().to_string();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Http(format!("{} {}: {}", status, url, body)))
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn fetch_history(&self, chat_id: &str) -> Result<Vec<StoredMessage>> {
        let req = self.client.get(self.url(&format!("/messages/{}", chat_id)));
        let resp = Self::checked(self.authorized(req).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn create_message(&self, draft: &NewMessage) -> Result<StoredMessage> {
        let req = self.client.post(self.url("/messages")).json(draft);
        let resp = Self::checked(self.authorized(req).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn record_call(&self, record: &CallRecord) -> Result<()> {
        let req = self.client.post(self.url("/calls")).json(record);
        Self::checked(self.authorized(req).send().await?).await?;
        Ok(())
    }

    async fn fetch_following(&self, user_id: &str) -> Result<Vec<User>> {
        let req = self
            .client
            .get(self.url(&format!("/users/{}/following", user_id)));
        let resp = Self::checked(self.authorized(req).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        let req = self.client.get(self.url("/notifications"));
        let resp = Self::checked(self.authorized(req).send().await?).await?;
        Ok(resp.json().await?)
    }
}
