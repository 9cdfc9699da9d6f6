//! Credentials and identity payloads.

use crate::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercase and trim an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Credential presented to the remote authentication service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    EmailPassword { email: String, password: String },
    ExternalIdentity { id_token: String },
}

impl Credentials {
    pub fn provider(&self) -> &'static str {
        match self {
            Credentials::EmailPassword { .. } => "local-userpass",
            Credentials::ExternalIdentity { .. } => "oauth2-apple",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .field("password", &"***")
                .finish(),
            Credentials::ExternalIdentity { .. } => f
                .debug_struct("ExternalIdentity")
                .field("id_token", &"***")
                .finish(),
        }
    }
}

/// Payload delivered by the external identity provider callback.
///
/// Name and email are only present on a user's first authorization.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdentity {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub identity_token: Option<String>,
}

impl ExternalIdentity {
    /// The identity token, or `MalformedCredential` when absent or blank.
    pub fn token(&self) -> AuthResult<&str> {
        match self.identity_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            Some(_) => Err(AuthError::MalformedCredential(
                "identity token is empty".to_string(),
            )),
            None => Err(AuthError::MalformedCredential(
                "identity token is missing".to_string(),
            )),
        }
    }
}

impl fmt::Debug for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalIdentity")
            .field("email", &self.email)
            .field("given_name", &self.given_name)
            .field("family_name", &self.family_name)
            .field("has_identity_token", &self.identity_token.is_some())
            .finish()
    }
}
