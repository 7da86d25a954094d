use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::clock::Clock;
use super::notifier::{SignInNotifier, SignInWaiter};
use super::refresh::TokenRefresher;
use super::store::CredentialStore;
use super::types::OAuthConfig;
use crate::error::Result;

/// Token provider
/// Hands out a currently valid access token, refreshing or waiting for sign-in as needed
pub struct TokenProvider {
    /// Durable token pair
    store: Arc<CredentialStore>,

    /// Refresh-token exchange
    refresher: TokenRefresher,

    /// Woken by every credential write
    notifier: SignInNotifier,

    clock: Arc<dyn Clock>,

    /// Where the user goes to sign in
    sign_in_url: String,

    /// Upper bound on waiting for sign-in (None = wait forever)
    sign_in_timeout: Option<Duration>,

    /// Held for the duration of a refresh so concurrent callers share it
    refresh_lock: Mutex<()>,
}

impl TokenProvider {
    pub fn new(store: Arc<CredentialStore>, refresher: TokenRefresher, config: &OAuthConfig) -> Self {
        Self {
            notifier: store.notifier().clone(),
            clock: store.clock(),
            store,
            refresher,
            sign_in_url: config.sign_in_url(),
            sign_in_timeout: None,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_sign_in_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sign_in_timeout = timeout;
        self
    }

    pub fn sign_in_url(&self) -> &str {
        &self.sign_in_url
    }

    /// Get a valid access token.
    ///
    /// - no usable credentials: print the sign-in instruction and wait for
    ///   the next credential write
    /// - expired (or no expiry recorded): refresh, then return the new token
    /// - otherwise: return the stored token without touching the network
    pub async fn get_token(&self) -> Result<String> {
        // Registered before reading so a write racing with the read still wakes us
        let waiter = self.notifier.wait_for_sign_in();

        let Some(record) = self.store.read()? else {
            return self.await_sign_in(waiter).await;
        };
        drop(waiter);

        if !record.is_expired(self.clock.now()) {
            tracing::debug!("Using stored access token");
            return Ok(record.access_token);
        }

        tracing::debug!("Access token expired, refresh needed");
        self.refresh_single_flight().await
    }

    /// Refresh unless another caller already did while we queued for the lock
    async fn refresh_single_flight(&self) -> Result<String> {
        let waiter = self.notifier.wait_for_sign_in();
        let guard = self.refresh_lock.lock().await;

        match self.store.read()? {
            Some(record) if !record.is_expired(self.clock.now()) => {
                tracing::debug!("Token refreshed by a concurrent caller");
                Ok(record.access_token)
            }
            Some(record) => self.refresher.refresh(&record.refresh_token).await,
            None => {
                drop(guard);
                self.await_sign_in(waiter).await
            }
        }
    }

    async fn await_sign_in(&self, waiter: SignInWaiter) -> Result<String> {
        println!("Open {} to sign in", self.sign_in_url);
        tracing::info!(
            timeout = ?self.sign_in_timeout,
            "No Twitch credentials stored, waiting for sign-in"
        );

        let token = waiter.wait_timeout(self.sign_in_timeout).await?;
        tracing::info!("Sign-in completed");
        Ok(token)
    }
}
