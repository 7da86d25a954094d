// Token refresh logic

use reqwest::Client;
use std::sync::Arc;

use super::store::CredentialStore;
use super::types::{OAuthConfig, TokenResponse};
use crate::error::{AuthError, Result};

/// Exchanges a refresh token for a new pair and persists the result
pub struct TokenRefresher {
    client: Client,
    config: OAuthConfig,
    store: Arc<CredentialStore>,
}

impl TokenRefresher {
    pub fn new(client: Client, config: OAuthConfig, store: Arc<CredentialStore>) -> Self {
        Self {
            client,
            config,
            store,
        }
    }

    /// Refresh via `grant_type=refresh_token`, returning the new access token.
    ///
    /// The rotated refresh token replaces the old one in storage. On any
    /// failure the stored pair is left untouched.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        tracing::info!("Refreshing Twitch access token...");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %self.config.token_url, "Token endpoint unreachable");
                AuthError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                "Token refresh failed: status={}, body={}",
                status,
                error_text
            );

            // Twitch reports {"status":400,"message":"Invalid refresh token"}
            let message = serde_json::from_str::<serde_json::Value>(&error_text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(error_text);

            return Err(AuthError::AuthProvider {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let data: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("malformed token response: {}", e)))?;

        if data.access_token.is_empty() || data.refresh_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "token response contains an empty token".to_string(),
            ));
        }

        self.store
            .write(&data.access_token, &data.refresh_token, data.expires_in)?;

        tracing::info!(
            expires_in = data.expires_in,
            scope = ?data.scope,
            "Token refreshed"
        );

        Ok(data.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::{Clock, ManualClock};
    use chrono::Utc;
    use mockito::Matcher;
    use rusqlite::Connection;

    fn setup(server: &mockito::ServerGuard) -> (TokenRefresher, Arc<CredentialStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(
            CredentialStore::from_connection(Connection::open_in_memory().unwrap(), clock.clone())
                .unwrap(),
        );
        let config = OAuthConfig::new("client-id", "client-secret", "http://localhost:3000")
            .with_token_url(format!("{}/oauth2/token", server.url()));
        let refresher = TokenRefresher::new(Client::new(), config, store.clone());
        (refresher, store, clock)
    }

    fn refresh_query(refresh_token: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".into(), "client-id".into()),
            Matcher::UrlEncoded("client_secret".into(), "client-secret".into()),
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), refresh_token.into()),
        ])
    }

    #[tokio::test]
    async fn test_refresh_success_rotates_pair() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_query(refresh_query("RT1"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"AT2","refresh_token":"RT2","expires_in":3600,"scope":["chat:read"],"token_type":"bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let (refresher, store, clock) = setup(&server);
        store.write("AT1", "RT1", 0).unwrap();

        let token = refresher.refresh("RT1").await.unwrap();
        assert_eq!(token, "AT2");
        mock.assert_async().await;

        let record = store.read().unwrap().unwrap();
        assert_eq!(record.access_token, "AT2");
        assert_eq!(record.refresh_token, "RT2");
        assert_eq!(
            record.expires_at.unwrap().timestamp_millis(),
            clock.now().timestamp_millis() + 3_600_000
        );
    }

    #[tokio::test]
    async fn test_refresh_unauthorized_leaves_store_untouched() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"status":401,"message":"invalid client secret"}"#)
            .create_async()
            .await;

        let (refresher, store, _clock) = setup(&server);
        store.write("AT1", "RT1", 0).unwrap();
        let before = store.read().unwrap().unwrap();

        let err = refresher.refresh("RT1").await.unwrap_err();
        assert!(err.is_auth_provider());
        match err {
            AuthError::AuthProvider { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid client secret");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(store.read().unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_refresh_non_json_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let (refresher, _store, _clock) = setup(&server);
        match refresher.refresh("RT1").await {
            Err(AuthError::AuthProvider { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_accepts_any_scope_shape() {
        for body in [
            r#"{"access_token":"AT2","refresh_token":"RT2","expires_in":3600,"scope":"chat:read chat:edit"}"#,
            r#"{"access_token":"AT2","refresh_token":"RT2","expires_in":3600,"scope":null,"token_type":null}"#,
        ] {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/oauth2/token")
                .match_query(Matcher::Any)
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(body)
                .create_async()
                .await;

            let (refresher, store, _clock) = setup(&server);
            store.write("AT1", "RT1", 0).unwrap();

            assert_eq!(refresher.refresh("RT1").await.unwrap(), "AT2");
            assert_eq!(store.read().unwrap().unwrap().refresh_token, "RT2");
        }
    }

    #[tokio::test]
    async fn test_refresh_surfaces_storage_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"AT2","refresh_token":"RT2","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlite.db");
        let store = Arc::new(CredentialStore::open(&path).unwrap());
        store.write("AT1", "RT1", 0).unwrap();

        // Pull the table out from under the store
        Connection::open(&path)
            .unwrap()
            .execute("DROP TABLE access", [])
            .unwrap();

        let config = OAuthConfig::new("client-id", "client-secret", "http://localhost:3000")
            .with_token_url(format!("{}/oauth2/token", server.url()));
        let refresher = TokenRefresher::new(Client::new(), config, store);

        let err = refresher.refresh("RT1").await.unwrap_err();
        assert!(err.is_storage());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"access_token":"AT2"}"#)
            .create_async()
            .await;

        let (refresher, store, _clock) = setup(&server);
        let result = refresher.refresh("RT1").await;
        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
        assert!(store.read().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_empty_access_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"access_token":"","refresh_token":"RT2","expires_in":3600}"#)
            .create_async()
            .await;

        let (refresher, _store, _clock) = setup(&server);
        let result = refresher.refresh("RT1").await;
        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_refresh_unreachable_endpoint() {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        // Nothing listens on the discard port
        let config = OAuthConfig::new("id", "secret", "http://localhost:3000")
            .with_token_url("http://127.0.0.1:9/oauth2/token");
        let refresher = TokenRefresher::new(Client::new(), config, store);

        let result = refresher.refresh("RT1").await;
        assert!(matches!(result, Err(AuthError::Transport(_))));
    }
}
