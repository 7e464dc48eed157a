use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const DOCUMENTS_SCOPE: &str = "https://www.googleapis.com/auth/documents";

/// Scopes requested by every user-facing authorization flow.
pub const SCOPES: &[&str] = &[DRIVE_SCOPE, DOCUMENTS_SCOPE];

/// A token that expires within this window is treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Token endpoint error: {0}")]
    TokenEndpoint(String),

    /// The token endpoint answered `invalid_grant`: the refresh token was
    /// revoked or expired.
    #[error("Grant rejected by token endpoint: {0}")]
    InvalidGrant(String),

    #[error("Credential storage error: {0}")]
    Store(String),

    #[error("Authorization callback failed: {0}")]
    Callback(String),

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Authorization required")]
    AuthorizationRequired,

    #[error("Authorization required, redirect to {authorization_url}")]
    RedirectRequired { authorization_url: String },
}

/// Bearer credential as persisted in the token file or a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Builds a credential from a token endpoint response.
    ///
    /// Refresh responses usually omit `refresh_token`; the previous one is kept then.
    pub fn from_grant(grant: TokenGrant, previous_refresh: Option<String>, now: DateTime<Utc>) -> Self {
        let scopes = grant
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh),
            expiry: grant.expires_in.map(|secs| now + Duration::seconds(secs)),
            scopes,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry > now + Duration::seconds(EXPIRY_SKEW_SECS),
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Response body of the OAuth2 token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    pub token_type: Option<String>,
}
