//! HTTP client configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the HTTP client used by bot sessions
///
/// No timeout is applied unless one is configured; callers that need tighter
/// bounds can also wrap individual calls in `tokio::time::timeout`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: None,
            user_agent: format!("botauth/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(self.user_agent.clone());
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder.build()?)
    }
}
