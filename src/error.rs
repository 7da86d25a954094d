// Error handling module
// Defines the error taxonomy for the token lifecycle

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while acquiring, refreshing or storing credentials
#[derive(Error, Debug)]
pub enum AuthError {
    /// Persistence layer unreachable or corrupt
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Connection mutex poisoned by a panicking writer
    #[error("Storage error: connection lock poisoned")]
    StorageLock,

    /// Non-success response from the OAuth token endpoint
    #[error("Auth provider error: {status} - {message}")]
    AuthProvider { status: u16, message: String },

    /// Network failure while talking to the OAuth provider
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Token endpoint answered 2xx with an unusable body
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Credentials rejected before reaching storage
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Nobody completed sign-in within the configured window
    #[error("Timed out after {0:?} waiting for sign-in")]
    SignInTimeout(Duration),

    /// The notifier went away while a waiter was pending
    #[error("Sign-in notifier closed")]
    NotifierClosed,
}

impl AuthError {
    /// True for failures of the persistence layer
    pub fn is_storage(&self) -> bool {
        matches!(self, AuthError::Storage(_) | AuthError::StorageLock)
    }

    /// True when the token endpoint rejected the exchange
    pub fn is_auth_provider(&self) -> bool {
        matches!(self, AuthError::AuthProvider { .. })
    }
}

/// Result type alias for token lifecycle operations
pub type Result<T> = std::result::Result<T, AuthError>;
