// libs/session-cell/src/services/identity.rs
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_models::auth::Identity;

use crate::error::SessionError;

/// Signed-in principal of the current client session.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<Identity>;

    /// Observes sign-in and sign-out.
    fn auth_state(&self) -> watch::Receiver<Option<Identity>>;

    async fn sign_out(&self) -> Result<(), SessionError>;
}

#[derive(Debug, Deserialize)]
struct AuthUserResponse {
    id: String,
    #[serde(default)]
    user_metadata: Option<serde_json::Value>,
}

/// Supabase Auth (GoTrue) backed identity.
pub struct SupabaseIdentityProvider {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Mutex<Option<String>>,
    state: watch::Sender<Option<Identity>>,
}

impl SupabaseIdentityProvider {
    pub fn new(config: &AppConfig) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            access_token: Mutex::new(None),
            state,
        }
    }

    /// Resolves the user behind `access_token` and makes it the current user.
    /// GET /auth/v1/user
    pub async fn sign_in_with_token(&self, access_token: &str) -> Result<Identity, SessionError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SessionError::InvalidToken(format!("identity provider answered {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Identity lookup failed: {} - {}", status, body);
            return Err(SessionError::Identity(format!("HTTP {}: {}", status, body)));
        }

        let user: AuthUserResponse = response.json().await?;
        let display_name = user.user_metadata.as_ref().and_then(|meta| {
            ["full_name", "name", "display_name"]
                .iter()
                .find_map(|key| meta.get(*key).and_then(|v| v.as_str()))
                .map(str::to_string)
        });

        let identity = Identity {
            id: user.id,
            display_name,
        };

        if let Ok(mut token) = self.access_token.lock() {
            *token = Some(access_token.to_string());
        }
        self.state.send_replace(Some(identity.clone()));

        info!("Signed in as {}", identity.id);
        Ok(identity)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    fn current_user(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    /// Clears the local session first, then revokes it remotely.
    /// POST /auth/v1/logout
    async fn sign_out(&self) -> Result<(), SessionError> {
        let token = self
            .access_token
            .lock()
            .map(|mut token| token.take())
            .unwrap_or_default();
        self.state.send_replace(None);

        let Some(token) = token else {
            debug!("Sign-out without an active session");
            return Ok(());
        };

        let url = format!("{}/auth/v1/logout", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SessionError::Identity(format!(
                "logout answered HTTP {}",
                response.status()
            )));
        }

        info!("Signed out");
        Ok(())
    }
}
