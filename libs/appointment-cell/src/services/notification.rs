// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_database::DocumentStore;

use crate::models::USERS_COLLECTION;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notifier is not configured")]
    NotConfigured,

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::Delivery(err.to_string())
    }
}

/// Outbound message channel (SMS or similar) keyed by a contact string.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, contact: &str, message: &str) -> Result<(), NotificationError>;
}

/// SMS gateway client. Sends `{"to", "body"}` as JSON with a bearer token.
pub struct SmsGatewayNotifier {
    client: Client,
    gateway_url: String,
    api_token: String,
}

impl std::fmt::Debug for SmsGatewayNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsGatewayNotifier")
            .field("gateway_url", &self.gateway_url)
            .finish_non_exhaustive()
    }
}

impl SmsGatewayNotifier {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_sms_configured() {
            return Err(NotificationError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            gateway_url: config.sms_gateway_url.clone(),
            api_token: config.sms_gateway_token.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmsGatewayNotifier {
    async fn notify(&self, contact: &str, message: &str) -> Result<(), NotificationError> {
        debug!("Sending SMS to {}", contact);

        let response = self
            .client
            .post(&self.gateway_url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&json!({ "to": contact, "body": message }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("SMS gateway rejected message: {} - {}", status, body);
            return Err(NotificationError::Delivery(format!("HTTP {}: {}", status, body)));
        }

        Ok(())
    }
}

/// Fallback used when no SMS gateway is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, contact: &str, message: &str) -> Result<(), NotificationError> {
        info!("Notification for {}: {}", contact, message);
        Ok(())
    }
}

/// Resolves a user's phone number and hands the message to the notifier.
/// Delivery is best-effort: every failure is logged and swallowed.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn DocumentStore>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, store: Arc<dyn DocumentStore>) -> Self {
        Self { notifier, store }
    }

    pub async fn notify_user(&self, user_id: &str, message: &str) {
        let contact = match self.store.get(USERS_COLLECTION, user_id).await {
            Ok(Some(profile)) => profile
                .get("phoneNumber")
                .and_then(|value| value.as_str())
                .filter(|phone| !phone.trim().is_empty())
                .map(str::to_string),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not load contact details for user {}: {}", user_id, e);
                return;
            }
        };

        let Some(contact) = contact else {
            debug!("User {} has no phone number, skipping notification", user_id);
            return;
        };

        if let Err(e) = self.notifier.notify(&contact, message).await {
            warn!("Notification to user {} failed: {}", user_id, e);
        }
    }
}
