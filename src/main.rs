use anyhow::{Context, Result};
use std::sync::Arc;

use twitch_bot_auth::auth::{CredentialStore, TokenProvider, TokenRefresher};
use twitch_bot_auth::config;
use twitch_bot_auth::http_client::{AuthenticatedRequester, RequestOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // First run: ask for the Twitch application settings
    if config::needs_interactive_setup() {
        let interactive_config = config::run_interactive_setup()?;

        // Set environment variables so Config::load() can use them
        std::env::set_var("TWITCH_BOT_CLIENT_ID", &interactive_config.client_id);
        std::env::set_var("TWITCH_BOT_CLIENT_SECRET", &interactive_config.client_secret);
        std::env::set_var("HOSTNAME_URL", &interactive_config.hostname);
    }

    // Load configuration first (for log level)
    let config = config::Config::load()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    config.validate()?;

    tracing::info!("Twitch bot auth starting...");

    let store = Arc::new(
        CredentialStore::open(&config.db_file).context("Failed to open credential store")?,
    );

    let requester = AuthenticatedRequester::new(
        &config.oauth,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?;
    let refresher = TokenRefresher::new(
        requester.client().clone(),
        config.oauth.clone(),
        store.clone(),
    );
    let provider = TokenProvider::new(store.clone(), refresher, &config.oauth)
        .with_sign_in_timeout(config.sign_in_timeout);

    let token = tokio::select! {
        result = provider.get_token() => result,
        _ = shutdown_signal() => {
            drop(provider);
            close_store(store);
            return Ok(());
        }
    };

    let token = match token {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Authentication failed: {}", e);
            if e.is_auth_provider() {
                tracing::error!("Stored refresh token was rejected, sign in again at {}", provider.sign_in_url());
            }
            drop(provider);
            close_store(store);
            anyhow::bail!("Startup failed: no valid Twitch access token");
        }
    };

    tracing::info!(
        "Authentication successful (token: {}...)",
        token.chars().take(6).collect::<String>()
    );

    // Make sure the token is accepted before anything connects with it
    let login = match fetch_login(&requester, &config.api_url, &token).await {
        Ok(login) => login,
        Err(e) => {
            tracing::error!("Twitch API rejected the token: {:#}", e);
            drop(provider);
            close_store(store);
            anyhow::bail!("Startup failed: unable to verify Twitch identity");
        }
    };
    tracing::info!("Signed in to Twitch as {}", login);

    drop(provider);
    close_store(store);
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolve the login name the token belongs to
async fn fetch_login(
    requester: &AuthenticatedRequester,
    api_url: &str,
    token: &str,
) -> Result<String> {
    let response = requester
        .request(&format!("{}/users", api_url), token, RequestOptions::default())
        .await
        .context("Failed to reach Twitch API")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("GET /users failed: {} - {}", status, body);
    }

    let json: serde_json::Value = response
        .json()
        .await
        .context("Failed to parse /users response")?;

    json.get("data")
        .and_then(|d| d.get(0))
        .and_then(|u| u.get("login"))
        .and_then(|l| l.as_str())
        .map(str::to_string)
        .context("/users response does not contain a login")
}

/// Close the store once every other handle is gone
fn close_store(store: Arc<CredentialStore>) {
    match Arc::try_unwrap(store) {
        Ok(store) => {
            if let Err(e) = store.close() {
                tracing::error!("Failed to close credential store: {}", e);
            }
        }
        Err(_) => tracing::warn!("Credential store still in use, leaving it to drop"),
    }
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
