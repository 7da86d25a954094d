// Sign-in wait/notify handshake
// Pending token requests park here until new credentials are written

use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::{AuthError, Result};

/// Buffered sign-in events per waiter before it starts lagging
const SIGN_IN_CHANNEL_CAPACITY: usize = 16;

/// Broadcasts freshly written access tokens to every registered waiter
///
/// Cloning is cheap and every clone feeds the same set of waiters.
#[derive(Debug, Clone)]
pub struct SignInNotifier {
    sender: broadcast::Sender<String>,
}

impl SignInNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGN_IN_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Register a waiter for the next credential write.
    ///
    /// Registration happens here, not when the returned waiter is first
    /// awaited, so a write that lands in between is not missed.
    pub fn wait_for_sign_in(&self) -> SignInWaiter {
        SignInWaiter {
            receiver: self.subscribe(),
        }
    }

    /// Raw receiver yielding every subsequent sign-in event in order
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Wake every registered waiter with `access_token`.
    /// Returns how many waiters were listening.
    pub fn notify(&self, access_token: &str) -> usize {
        match self.sender.send(access_token.to_string()) {
            Ok(count) => {
                tracing::debug!(waiters = count, "Sign-in event delivered");
                count
            }
            // No waiters registered
            Err(_) => 0,
        }
    }

    /// Number of waiters currently registered
    pub fn waiter_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SignInNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// A single pending wait for the next sign-in
#[derive(Debug)]
pub struct SignInWaiter {
    receiver: broadcast::Receiver<String>,
}

impl SignInWaiter {
    /// Resolve with the access token of the first write after registration
    pub async fn wait(mut self) -> Result<String> {
        loop {
            match self.receiver.recv().await {
                Ok(access_token) => return Ok(access_token),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Sign-in waiter lagged behind, using next event");
                }
                Err(RecvError::Closed) => return Err(AuthError::NotifierClosed),
            }
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout` when one is set
    pub async fn wait_timeout(self, timeout: Option<Duration>) -> Result<String> {
        match timeout {
            None => self.wait().await,
            Some(limit) => tokio::time::timeout(limit, self.wait())
                .await
                .map_err(|_| AuthError::SignInTimeout(limit))?,
        }
    }
}
