//! URL derivation for bot endpoints

/// Path prefix of every bot REST endpoint
pub const API_BASE: &str = "/api/v1";

/// Append the API prefix to a bot URL unless it is already there
///
/// Trailing slashes are trimmed first, so applying this twice yields the
/// same string.
pub fn base_url_for(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if trimmed.ends_with(API_BASE) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, API_BASE)
    }
}

/// Websocket counterpart of an http(s) URL, or an empty string for any other scheme
pub fn ws_url_for(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else {
        String::new()
    }
}

/// Full URL of an endpoint below the API prefix, e.g. `/token/login`
pub fn endpoint_url(api_url: &str, path: &str) -> String {
    format!("{}{}", base_url_for(api_url), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_appends_prefix() {
        assert_eq!(base_url_for("http://x.com"), "http://x.com/api/v1");
    }

    #[test]
    fn test_base_url_is_idempotent() {
        let once = base_url_for("http://x.com");
        assert_eq!(base_url_for(&once), once);
        assert_eq!(base_url_for("http://x.com/api/v1/"), "http://x.com/api/v1");
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        assert_eq!(base_url_for("http://x.com/"), "http://x.com/api/v1");
    }

    #[test]
    fn test_base_url_empty() {
        assert_eq!(base_url_for(""), "/api/v1");
    }

    #[test]
    fn test_ws_url() {
        assert_eq!(ws_url_for("https://x.com/api/v1"), "wss://x.com/api/v1");
        assert_eq!(ws_url_for("http://x.com/api/v1"), "ws://x.com/api/v1");
        assert_eq!(ws_url_for("ftp://x.com/api/v1"), "");
        assert_eq!(ws_url_for("/api/v1"), "");
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("http://x.com", "/token/login"),
            "http://x.com/api/v1/token/login"
        );
        assert_eq!(
            endpoint_url("http://x.com/api/v1", "/token/refresh"),
            "http://x.com/api/v1/token/refresh"
        );
    }
}
