//! Error types for the bot credential registry

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotAuthError>;

/// Boxed underlying cause of a failed refresh
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BotAuthError {
    /// Credentials were rejected or the login response carried no tokens
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// The refresh token was rejected; stored tokens have been cleared
    #[error("Refresh token expired for bot {0}")]
    RefreshTokenExpired(String),

    /// The bot answered 404 or 5xx; retrying later may succeed
    #[error("Bot {bot_id} unreachable (HTTP {status})")]
    BotUnreachable { bot_id: String, status: u16 },

    #[error("Token refresh failed for bot {bot_id}: {source}")]
    RefreshFailed {
        bot_id: String,
        #[source]
        source: BoxError,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unknown bot: {0}")]
    UnknownBot(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotAuthError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn login_failed(msg: impl Into<String>) -> Self {
        Self::LoginFailed(msg.into())
    }

    pub(crate) fn refresh_failed(
        bot_id: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::RefreshFailed {
            bot_id: bot_id.into(),
            source: source.into(),
        }
    }

    /// True for failures the caller can resolve by retrying later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BotUnreachable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BotAuthError::BotUnreachable {
            bot_id: "bot1".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "Bot bot1 unreachable (HTTP 503)");
        assert!(err.is_transient());

        let err = BotAuthError::RefreshTokenExpired("bot1".to_string());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("bot1"));
    }

    #[test]
    fn test_refresh_failed_keeps_source() {
        use std::error::Error as _;

        let err = BotAuthError::refresh_failed("bot1", "HTTP 400 Bad Request");
        assert!(err.to_string().contains("HTTP 400 Bad Request"));
        assert!(err.source().is_some());
    }
}
