// Authentication types

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Default Twitch OAuth2 token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Path (relative to the hostname) where interactive sign-in starts
pub const SIGN_IN_PATH: &str = "/auth/twitch";

/// OAuth client settings handed to the refresher and the requester
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Human-facing base URL, only used to print the sign-in instruction
    pub hostname: String,

    pub token_url: String,
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            hostname: hostname.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Override the token endpoint (useful against a local mock)
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// URL the user must open to complete interactive sign-in
    pub fn sign_in_url(&self) -> String {
        format!("{}{}", self.hostname.trim_end_matches('/'), SIGN_IN_PATH)
    }
}

/// The single persisted token pair
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub id: i64,
    pub access_token: String,
    pub refresh_token: String,

    /// Absolute instant after which the access token is invalid
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// A record with no expiry is treated as already expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(exp) => now >= exp,
        }
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,

    /// Lifetime in seconds from issuance
    pub expires_in: u64,

    /// Array on Twitch, space-delimited string elsewhere; only logged
    #[serde(default)]
    pub scope: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: Option<DateTime<Utc>>) -> CredentialRecord {
        CredentialRecord {
            id: 1,
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        assert!(!record(Some(now + Duration::seconds(10))).is_expired(now));
        assert!(record(Some(now - Duration::seconds(10))).is_expired(now));
        // Boundary: now == expires_at counts as expired
        assert!(record(Some(now)).is_expired(now));
        assert!(record(None).is_expired(now));
    }

    #[test]
    fn test_sign_in_url() {
        let config = OAuthConfig::new("id", "secret", "https://bot.example.com/");
        assert_eq!(config.sign_in_url(), "https://bot.example.com/auth/twitch");

        let config = OAuthConfig::new("id", "secret", "http://localhost:3000");
        assert_eq!(config.sign_in_url(), "http://localhost:3000/auth/twitch");
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
    }

    #[test]
    fn test_token_response_parsing() {
        let data: TokenResponse = serde_json::from_str(
            r#"{"access_token":"AT","refresh_token":"RT","expires_in":14124,
                "scope":["chat:read","chat:edit"],"token_type":"bearer"}"#,
        )
        .unwrap();
        assert_eq!(data.access_token, "AT");
        assert_eq!(data.refresh_token, "RT");
        assert_eq!(data.expires_in, 14124);
        assert_eq!(data.scope.unwrap().as_array().unwrap().len(), 2);

        // scope is optional
        let data: TokenResponse =
            serde_json::from_str(r#"{"access_token":"AT","refresh_token":"RT","expires_in":60}"#)
                .unwrap();
        assert!(data.scope.is_none());
    }

    #[test]
    fn test_token_response_scope_shapes() {
        let data: TokenResponse = serde_json::from_str(
            r#"{"access_token":"AT","refresh_token":"RT","expires_in":60,"scope":"chat:read chat:edit"}"#,
        )
        .unwrap();
        assert_eq!(data.scope.unwrap(), "chat:read chat:edit");

        let data: TokenResponse = serde_json::from_str(
            r#"{"access_token":"AT","refresh_token":"RT","expires_in":60,"scope":null,"token_type":null}"#,
        )
        .unwrap();
        assert!(data.scope.is_none());
        assert_eq!(data.access_token, "AT");
    }

    #[test]
    fn test_token_response_missing_field() {
        let result =
            serde_json::from_str::<TokenResponse>(r#"{"access_token":"AT","expires_in":60}"#);
        assert!(result.is_err());
    }
}
