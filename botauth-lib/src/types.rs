//! Core data types: stored auth records, display descriptors and login payloads

use serde::{Deserialize, Serialize};

/// Authentication state stored for one bot
///
/// Field names are camelCase on disk. Missing fields fall back to their
/// defaults so partially written records still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRecord {
    pub bot_name: String,
    pub api_url: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub auto_refresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_id: Option<i64>,
}

impl AuthRecord {
    /// A record counts as logged in once it has both an API URL and a refresh token
    pub fn is_logged_in(&self) -> bool {
        !self.api_url.is_empty() && !self.refresh_token.is_empty()
    }

    /// Drop both tokens, leaving the rest of the record intact
    pub fn clear_tokens(&mut self) {
        self.access_token.clear();
        self.refresh_token.clear();
    }
}

/// Partial update merged into an [`AuthRecord`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub bot_name: Option<String>,
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub auto_refresh: Option<bool>,
    pub sort_id: Option<i64>,
}

impl RecordUpdate {
    pub fn bot_name(mut self, name: impl Into<String>) -> Self {
        self.bot_name = Some(name.into());
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn sort_id(mut self, sort_id: i64) -> Self {
        self.sort_id = Some(sort_id);
        self
    }

    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = Some(enabled);
        self
    }

    pub fn apply(self, record: &mut AuthRecord) {
        if let Some(v) = self.bot_name {
            record.bot_name = v;
        }
        if let Some(v) = self.api_url {
            record.api_url = v;
        }
        if let Some(v) = self.username {
            record.username = v;
        }
        if let Some(v) = self.access_token {
            record.access_token = v;
        }
        if let Some(v) = self.refresh_token {
            record.refresh_token = v;
        }
        if let Some(v) = self.auto_refresh {
            record.auto_refresh = v;
        }
        if let Some(v) = self.sort_id {
            record.sort_id = Some(v);
        }
    }
}

/// What a bot picker needs to show one entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BotDescriptor {
    pub bot_id: String,
    pub bot_name: String,
    pub bot_url: String,
    pub sort_id: i64,
}

/// Credentials supplied by the user for a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub bot_name: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Token payload returned by the login and refresh endpoints
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
