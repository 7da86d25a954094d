use reqwest::{Client, Method, Response};
use std::time::Duration;

use crate::auth::OAuthConfig;
use crate::error::Result;

/// Per-request options for [`AuthenticatedRequester::request`]
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,

    /// Appended to the URL as a query string
    pub query: Vec<(String, String)>,

    /// Optional JSON body
    pub json: Option<serde_json::Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            json: None,
        }
    }
}

impl RequestOptions {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }
}

/// HTTP client for the Twitch API
///
/// Adds the bearer token and `Client-ID` header to every request. No retry,
/// no refresh: the caller hands in a token from the provider and gets back
/// whatever the server answered.
pub struct AuthenticatedRequester {
    /// Shared HTTP client with connection pooling
    client: Client,

    client_id: String,
}

impl AuthenticatedRequester {
    /// Create a requester with its own pooled client
    pub fn new(config: &OAuthConfig, connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing client
    pub fn with_client(client: Client, config: &OAuthConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
        }
    }

    /// Send an authenticated request; transport errors come back unchanged
    pub async fn request(
        &self,
        url: &str,
        token: &str,
        options: RequestOptions,
    ) -> std::result::Result<Response, reqwest::Error> {
        tracing::debug!(
            method = %options.method,
            url = %url,
            params = options.query.len(),
            "Sending authenticated request"
        );

        let mut builder = self
            .client
            .request(options.method, url)
            .bearer_auth(token)
            .header("Client-ID", &self.client_id);

        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = options.json {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        tracing::debug!(status = %response.status(), "Received HTTP response");
        Ok(response)
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
