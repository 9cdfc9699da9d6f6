//! Remote authentication service.

use crate::{AuthError, AuthResult, Credentials};
use async_trait::async_trait;
use cactus_config::Config;
use cactus_storage::StoreConfiguration;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// The email is already registered. Not an error.
    AlreadyExists,
}

/// Handle to an authenticated remote session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSession")
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Operations the session core needs from the authentication backend.
#[async_trait]
pub trait RemoteAuthService: Send + Sync {
    async fn register_user(&self, email: &str, password: &str) -> AuthResult<Registration>;

    async fn login(&self, credentials: &Credentials) -> AuthResult<UserSession>;

    async fn logout(&self, session: &UserSession) -> AuthResult<()>;

    /// Store configuration for an authenticated user.
    fn store_configuration(&self, session: &UserSession) -> StoreConfiguration;
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordLoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenLoginRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl ErrorResponse {
    fn describe(&self, status: StatusCode) -> String {
        match (&self.error_code, &self.error) {
            (Some(code), Some(msg)) => format!("{} ({})", msg, code),
            (None, Some(msg)) => msg.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => format!("HTTP {}", status),
        }
    }

    fn is_name_in_use(&self) -> bool {
        self.error_code.as_deref() == Some("AccountNameInUse")
            || self
                .error
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains("name already in use"))
    }
}

/// HTTPS client for the App Services client API.
#[derive(Clone)]
pub struct AppServicesClient {
    http: Client,
    base_url: String,
    app_id: String,
}

impl AppServicesClient {
    pub fn new(base_url: &str, app_id: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let base_url = config.base_url()?;
        Ok(Self::new(base_url.as_str(), &config.app_id))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn provider_url(&self, provider: &str, action: &str) -> String {
        format!(
            "{}/api/client/v2.0/app/{}/auth/providers/{}/{}",
            self.base_url, self.app_id, provider, action
        )
    }

    async fn error_body(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str(&body).unwrap_or_default();
        (status, parsed)
    }
}

impl fmt::Debug for AppServicesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppServicesClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish()
    }
}

#[async_trait]
impl RemoteAuthService for AppServicesClient {
    async fn register_user(&self, email: &str, password: &str) -> AuthResult<Registration> {
        let url = self.provider_url("local-userpass", "register");
        debug!(url = %url, "Registering user");

        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest { email, password })
            .send()
            .await?;

        if response.status().is_success() {
            info!("User registered");
            return Ok(Registration::Created);
        }

        let (status, body) = Self::error_body(response).await;
        if status == StatusCode::CONFLICT || body.is_name_in_use() {
            debug!("User already registered");
            return Ok(Registration::AlreadyExists);
        }

        warn!(status = %status, "Registration rejected");
        Err(AuthError::Registration(body.describe(status)))
    }

    async fn login(&self, credentials: &Credentials) -> AuthResult<UserSession> {
        let url = self.provider_url(credentials.provider(), "login");
        debug!(url = %url, provider = credentials.provider(), "Logging in");

        let request = self.http.post(&url);
        let request = match credentials {
            Credentials::EmailPassword { email, password } => {
                request.json(&PasswordLoginRequest {
                    username: email,
                    password,
                })
            }
            Credentials::ExternalIdentity { id_token } => {
                request.json(&TokenLoginRequest { id_token })
            }
        };
        let response = request.send().await?;

        if !response.status().is_success() {
            let (status, body) = Self::error_body(response).await;
            warn!(status = %status, provider = credentials.provider(), "Login rejected");
            return Err(AuthError::Authentication(body.describe(status)));
        }

        let login: LoginResponse = response.json().await?;
        info!(user_id = %login.user_id, "Logged in");

        Ok(UserSession {
            user_id: login.user_id,
            access_token: login.access_token,
            refresh_token: login.refresh_token,
            device_id: login.device_id,
        })
    }

    async fn logout(&self, session: &UserSession) -> AuthResult<()> {
        let url = format!("{}/api/client/v2.0/auth/session", self.base_url);
        debug!(url = %url, user_id = %session.user_id, "Revoking session");

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&session.refresh_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = Self::error_body(response).await;
            return Err(AuthError::Authentication(format!(
                "logout rejected: {}",
                body.describe(status)
            )));
        }

        Ok(())
    }

    fn store_configuration(&self, session: &UserSession) -> StoreConfiguration {
        StoreConfiguration {
            app_id: self.app_id.clone(),
            user_id: session.user_id.clone(),
            base_url: self.base_url.clone(),
            flexible_sync: true,
        }
    }
}
