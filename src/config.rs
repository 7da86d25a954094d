use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{OAuthConfig, DEFAULT_TOKEN_URL};

/// Twitch bot auth - keeps the bot's OAuth token fresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Twitch application client id
    #[arg(long, env = "TWITCH_BOT_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// Twitch application client secret
    #[arg(long, env = "TWITCH_BOT_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// Public base URL of the sign-in server
    #[arg(short = 'H', long, env = "HOSTNAME_URL", default_value = "http://localhost:3000")]
    pub hostname: String,

    /// Path to the SQLite credential database
    #[arg(short = 'd', long, env = "DB_FILE", default_value = "sqlite.db")]
    pub db_file: String,

    /// OAuth token endpoint
    #[arg(long, env = "TWITCH_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Twitch API base URL
    #[arg(long, env = "TWITCH_API_URL", default_value = "https://api.twitch.tv/helix")]
    pub api_url: String,

    /// Seconds to wait for sign-in before giving up (unset = wait forever)
    #[arg(long, env = "SIGN_IN_TIMEOUT")]
    pub sign_in_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // OAuth client
    pub oauth: OAuthConfig,

    // Storage
    pub db_file: PathBuf,

    // Twitch API
    pub api_url: String,

    // Timeouts
    pub sign_in_timeout: Option<Duration>,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    fn from_args(args: CliArgs) -> Self {
        let oauth = OAuthConfig::new(args.client_id, args.client_secret, args.hostname)
            .with_token_url(args.token_url);

        Config {
            oauth,
            db_file: expand_tilde(&args.db_file),
            api_url: args.api_url.trim_end_matches('/').to_string(),
            sign_in_timeout: parse_sign_in_timeout(args.sign_in_timeout),
            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_request_timeout: args.http_timeout,
            log_level: args.log_level,
        }
    }

    /// Validate configuration
    ///
    /// Missing client credentials are tolerated here; the token endpoint
    /// rejects them later.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() || self.oauth.client_secret.is_empty() {
            tracing::warn!(
                "TWITCH_BOT_CLIENT_ID or TWITCH_BOT_CLIENT_SECRET is empty, token refresh will be rejected"
            );
        }

        if let Some(parent) = self.db_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                anyhow::bail!(
                    "Directory for DB_FILE does not exist: {}",
                    parent.display()
                );
            }
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Zero means "no timeout", same as leaving it unset
fn parse_sign_in_timeout(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}


// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file and no client id)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();
    let has_client_id = std::env::var("TWITCH_BOT_CLIENT_ID").is_ok();

    !env_file_exists && !has_client_id
}

/// Run interactive setup to collect the Twitch application settings
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("No configuration found. Let's register the bot's Twitch application.");
    println!("Create one at https://dev.twitch.tv/console/apps if you haven't yet.");
    println!();

    let client_id: String = Input::new()
        .with_prompt("Twitch client id (TWITCH_BOT_CLIENT_ID)")
        .interact_text()
        .context("Failed to read TWITCH_BOT_CLIENT_ID")?;

    let client_secret: String = Password::new()
        .with_prompt("Twitch client secret (TWITCH_BOT_CLIENT_SECRET)")
        .interact()
        .context("Failed to read TWITCH_BOT_CLIENT_SECRET")?;

    if client_id.is_empty() || client_secret.is_empty() {
        anyhow::bail!("Client id and secret cannot be empty");
    }

    let hostname: String = Input::new()
        .with_prompt("Public URL of the sign-in server (HOSTNAME_URL)")
        .default("http://localhost:3000".to_string())
        .interact_text()
        .context("Failed to read HOSTNAME_URL")?;

    let config = InteractiveConfig {
        client_id,
        client_secret,
        hostname,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!("Configuration saved to .env file");
    }

    println!();
    Ok(config)
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub hostname: String,
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let env_content = format!(
        r#"# Twitch bot auth configuration
# Generated by interactive setup

TWITCH_BOT_CLIENT_ID={}
TWITCH_BOT_CLIENT_SECRET={}

# Sign-in instructions point at <HOSTNAME_URL>/auth/twitch
HOSTNAME_URL={}

# SQLite credential database
DB_FILE=sqlite.db

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.client_id, config.client_secret, config.hostname,
    );

    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(env_content.as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
