//! Per-bot session accessor
//!
//! A [`BotSession`] reads and writes one bot's entry in the shared
//! [`BotRegistry`] and runs the login/refresh handshakes against that bot.
//! Sessions only ever touch their own entry.

use crate::registry::BotRegistry;
use crate::types::{AuthRecord, AuthResponse, LoginCredentials, RecordUpdate};
use crate::urls::{base_url_for, endpoint_url, ws_url_for};
use crate::{BotAuthError, Result};
use reqwest::StatusCode;
use std::sync::Arc;

/// Login/refresh handle for a single bot
///
/// Concurrent `refresh_token` calls on the same bot are not serialized:
/// both requests go out and whichever response is written last wins.
#[derive(Clone)]
pub struct BotSession {
    bot_id: String,
    registry: Arc<BotRegistry>,
    client: reqwest::Client,
}

impl BotSession {
    pub fn new(
        bot_id: impl Into<String>,
        registry: Arc<BotRegistry>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            registry,
            client,
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Raw stored record, or the default one if the bot has no entry
    async fn stored(&self) -> AuthRecord {
        self.registry.get(&self.bot_id).await.unwrap_or_default()
    }

    /// Stored record if the bot is logged in, otherwise an empty placeholder
    pub async fn get_record(&self) -> AuthRecord {
        self.registry
            .get(&self.bot_id)
            .await
            .filter(AuthRecord::is_logged_in)
            .unwrap_or_default()
    }

    pub async fn set_record(&self, record: AuthRecord) -> Result<()> {
        self.registry.set(&self.bot_id, record).await
    }

    /// Merge the given fields into the stored record
    pub async fn update_fields(&self, update: RecordUpdate) -> Result<()> {
        self.registry
            .update(&self.bot_id, |record| update.apply(record))
            .await
    }

    /// Forget both tokens, keeping the entry itself
    pub async fn clear_tokens(&self) -> Result<()> {
        self.registry
            .update(&self.bot_id, AuthRecord::clear_tokens)
            .await
    }

    pub async fn logout(&self) -> Result<()> {
        tracing::info!(bot_id = %self.bot_id, "Logging out");
        self.registry.remove(&self.bot_id).await?;
        Ok(())
    }

    /// Exchange username/password for a token pair and store the result
    ///
    /// The request goes to [`endpoint_url`] of `credentials.url`, so the URL
    /// is normalized first: trailing slashes are dropped and an existing
    /// `/api/v1` suffix is not repeated. The stored `api_url` keeps the URL
    /// exactly as given. The registry is left untouched unless the bot
    /// returns both tokens.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<()> {
        let url = endpoint_url(&credentials.url, "/token/login");
        tracing::debug!(bot_id = %self.bot_id, %url, "Logging in");

        let response = self
            .client
            .post(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(bot_id = %self.bot_id, status = status.as_u16(), "Login rejected");
            return Err(BotAuthError::login_failed(format!("HTTP {}", status)));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| BotAuthError::login_failed(format!("Invalid login response: {}", e)))?;

        let (access_token, refresh_token) = match (body.access_token, body.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                (access, refresh)
            }
            _ => {
                return Err(BotAuthError::login_failed(
                    "Login response did not contain both tokens",
                ))
            }
        };

        let record = AuthRecord {
            bot_name: credentials.bot_name.clone(),
            api_url: credentials.url.clone(),
            username: credentials.username.clone(),
            access_token,
            refresh_token,
            auto_refresh: true,
            sort_id: None,
        };
        self.set_record(record).await?;

        tracing::info!(bot_id = %self.bot_id, "Logged in");
        Ok(())
    }

    /// Obtain a new access token using the stored refresh token
    ///
    /// On 401 both tokens are cleared before `RefreshTokenExpired` is
    /// returned. 404 and 5xx map to `BotUnreachable` and leave the tokens
    /// alone.
    pub async fn refresh_token(&self) -> Result<String> {
        let record = self
            .registry
            .get(&self.bot_id)
            .await
            .ok_or_else(|| BotAuthError::UnknownBot(self.bot_id.clone()))?;
        if record.refresh_token.is_empty() {
            return Err(BotAuthError::RefreshTokenExpired(self.bot_id.clone()));
        }

        let url = endpoint_url(&record.api_url, "/token/refresh");
        tracing::debug!(bot_id = %self.bot_id, %url, "Refreshing token");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&record.refresh_token)
            .send()
            .await
            .map_err(|e| BotAuthError::refresh_failed(&self.bot_id, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::info!(bot_id = %self.bot_id, "Refresh token rejected, clearing tokens");
            self.clear_tokens().await?;
            return Err(BotAuthError::RefreshTokenExpired(self.bot_id.clone()));
        }
        if status == StatusCode::NOT_FOUND || status.is_server_error() {
            tracing::warn!(
                bot_id = %self.bot_id,
                status = status.as_u16(),
                "Bot seems to be offline, retry later"
            );
            return Err(BotAuthError::BotUnreachable {
                bot_id: self.bot_id.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(BotAuthError::refresh_failed(
                &self.bot_id,
                format!("Unexpected HTTP status {}", status),
            ));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| BotAuthError::refresh_failed(&self.bot_id, e))?;
        let access_token = body
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                BotAuthError::refresh_failed(
                    &self.bot_id,
                    "Refresh response did not contain an access token",
                )
            })?;

        let stored = access_token.clone();
        self.registry
            .update(&self.bot_id, move |record| record.access_token = stored)
            .await?;
        Ok(access_token)
    }

    /// API URL with the `/api/v1` prefix applied
    pub async fn base_url(&self) -> String {
        base_url_for(&self.stored().await.api_url)
    }

    /// Websocket form of [`base_url`](Self::base_url), empty for non-http schemes
    pub async fn base_ws_url(&self) -> String {
        ws_url_for(&self.base_url().await)
    }

    pub async fn access_token(&self) -> String {
        self.stored().await.access_token
    }

    pub async fn api_url(&self) -> String {
        self.stored().await.api_url
    }

    pub async fn auto_refresh(&self) -> bool {
        self.stored().await.auto_refresh
    }

    pub async fn set_auto_refresh(&self, enabled: bool) -> Result<()> {
        self.registry
            .update(&self.bot_id, |record| record.auto_refresh = enabled)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SecretStore};

    async fn session(bot_id: &str) -> BotSession {
        let store: Arc<dyn SecretStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(BotRegistry::open(store).await.expect("open registry"));
        registry.session(bot_id, reqwest::Client::new())
    }

    fn logged_in(api_url: &str) -> AuthRecord {
        AuthRecord {
            bot_name: "Main".to_string(),
            api_url: api_url.to_string(),
            username: "freqtrader".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            auto_refresh: true,
            sort_id: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_bot_gets_placeholder() {
        let session = session("ftbot.0").await;
        let record = session.get_record().await;

        assert_eq!(record, AuthRecord::default());
        assert_eq!(record.bot_name, "");
        assert_eq!(record.refresh_token, "");
        assert!(!record.auto_refresh);
    }

    #[tokio::test]
    async fn test_set_and_get_record() {
        let session = session("ftbot.0").await;
        session
            .set_record(logged_in("http://x.com"))
            .await
            .expect("set record");

        assert_eq!(session.get_record().await, logged_in("http://x.com"));
        assert_eq!(session.access_token().await, "access");
        assert_eq!(session.api_url().await, "http://x.com");
        assert!(session.auto_refresh().await);
    }

    #[tokio::test]
    async fn test_cleared_tokens_yield_placeholder() {
        let session = session("ftbot.0").await;
        session
            .set_record(logged_in("http://x.com"))
            .await
            .expect("set record");

        session.clear_tokens().await.expect("clear tokens");

        assert_eq!(session.get_record().await, AuthRecord::default());
        // Entry itself is still registered
        assert_eq!(session.api_url().await, "http://x.com");
        assert_eq!(session.access_token().await, "");
    }

    #[tokio::test]
    async fn test_update_fields() {
        let session = session("ftbot.0").await;
        session
            .set_record(logged_in("http://x.com"))
            .await
            .expect("set record");

        session
            .update_fields(RecordUpdate::default().bot_name("Renamed").sort_id(4))
            .await
            .expect("update fields");

        let record = session.get_record().await;
        assert_eq!(record.bot_name, "Renamed");
        assert_eq!(record.sort_id, Some(4));
        assert_eq!(record.access_token, "access");
    }

    #[tokio::test]
    async fn test_mutating_unknown_bot_fails() {
        let session = session("ftbot.9").await;
        assert!(matches!(
            session.clear_tokens().await,
            Err(BotAuthError::UnknownBot(_))
        ));
        assert!(matches!(
            session.set_auto_refresh(true).await,
            Err(BotAuthError::UnknownBot(_))
        ));
        assert!(matches!(
            session.refresh_token().await,
            Err(BotAuthError::UnknownBot(_))
        ));
    }

    #[tokio::test]
    async fn test_set_auto_refresh_writes_through() {
        let session = session("ftbot.0").await;
        session
            .set_record(logged_in("http://x.com"))
            .await
            .expect("set record");

        session.set_auto_refresh(false).await.expect("set auto refresh");
        assert!(!session.auto_refresh().await);
        assert!(!session.get_record().await.auto_refresh);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_skips_network() {
        let session = session("ftbot.0").await;
        let mut record = logged_in("http://127.0.0.1:1");
        record.clear_tokens();
        session.set_record(record).await.expect("set record");

        assert!(matches!(
            session.refresh_token().await,
            Err(BotAuthError::RefreshTokenExpired(_))
        ));
    }

    #[tokio::test]
    async fn test_derived_urls() {
        let session = session("ftbot.0").await;
        assert_eq!(session.base_url().await, "/api/v1");
        assert_eq!(session.base_ws_url().await, "");

        session
            .set_record(logged_in("https://x.com"))
            .await
            .expect("set record");
        assert_eq!(session.base_url().await, "https://x.com/api/v1");
        assert_eq!(session.base_ws_url().await, "wss://x.com/api/v1");
    }

    #[tokio::test]
    async fn test_logout() {
        let session = session("ftbot.0").await;
        session
            .set_record(logged_in("http://x.com"))
            .await
            .expect("set record");

        session.logout().await.expect("logout");
        assert!(!session.registry.list_ids().await.contains(&"ftbot.0".to_string()));

        // Logging out twice is fine
        session.logout().await.expect("second logout");
    }
}
