//! Authentication error types.

use thiserror::Error;

/// Authentication and session lifecycle error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Remote registration rejected the email/password (not "already exists")
    #[error("Registration failed: {0}")]
    Registration(String),

    /// Remote login rejected the credential
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Credential rejected before any remote call
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// External identity provider delivered no usable token
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// Store could not be opened
    #[error("Store open failed: {0}")]
    StoreOpen(String),

    /// Subscription or store transaction error
    #[error("Sync error: {0}")]
    Sync(#[from] cactus_sync::SyncError),

    /// Component validation or decoding error
    #[error("Component error: {0}")]
    Component(#[from] cactus_components::ComponentError),

    /// Operation needs a session
    #[error("Not logged in")]
    NotLoggedIn,

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] cactus_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Nothing in the session core retries; callers use this to decide what to
    /// tell the user.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Timeout => true,
            AuthError::Sync(e) => e.is_transient(),
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

impl From<cactus_config::CoreError> for AuthError {
    fn from(e: cactus_config::CoreError) -> Self {
        AuthError::Config(e.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
