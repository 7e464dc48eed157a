// OAuth client configuration, read from the environment.
//
// **Environment Variables:**
// - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` - OAuth client (required)
// - `GOOGLE_PROJECT_ID` - Cloud project, informational
// - `GOOGLE_AUTH_URI` - consent endpoint
// - `GOOGLE_TOKEN_URI` - token endpoint
// - `GOOGLE_REDIRECT_URIS` - comma-separated; the local flow takes its host from the first
// - `APP_ENV` - `local` or `production`, picks the web-flow redirect URI
// - `GOOGLE_REDIRECT_URI_LOCAL` / `GOOGLE_REDIRECT_URI_HOSTED` - web-flow redirect URIs

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use url::Url;

use crate::core::auth::{AuthError, SCOPES};

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_REDIRECT_URIS: &str = "http://localhost:5000/";
pub const DEFAULT_LOCAL_REDIRECT_URI: &str = "http://localhost:5000/oauth2callback";

/// Paths the web front end serves itself; the callback cannot share them.
const RESERVED_WEB_PATHS: &[&str] = &["/", "/authorize"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentEnv {
    Local,
    Production,
}

impl FromStr for DeploymentEnv {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(DeploymentEnv::Local),
            "production" | "prod" | "hosted" => Ok(DeploymentEnv::Production),
            other => Err(AuthError::InvalidConfig(format!("unknown APP_ENV '{}'", other))),
        }
    }
}

/// Which credential provider the process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    LocalInteractive,
    WebRedirect,
    ServiceAccount,
}

impl FromStr for AuthFlow {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "installed" => Ok(AuthFlow::LocalInteractive),
            "web" | "redirect" => Ok(AuthFlow::WebRedirect),
            "service-account" | "service_account" => Ok(AuthFlow::ServiceAccount),
            other => Err(AuthError::InvalidConfig(format!("unknown AUTH_FLOW '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub project_id: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uris: Vec<String>,
    pub deployment: DeploymentEnv,
    pub local_redirect_uri: String,
    pub hosted_redirect_uri: Option<String>,
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| AuthError::MissingConfig(key.to_string()));

        let deployment = match get("APP_ENV") {
            Some(value) => value.parse()?,
            None => DeploymentEnv::Local,
        };

        let redirect_uris = get("GOOGLE_REDIRECT_URIS")
            .unwrap_or_else(|| DEFAULT_REDIRECT_URIS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            client_id: required("GOOGLE_CLIENT_ID")?,
            client_secret: required("GOOGLE_CLIENT_SECRET")?,
            project_id: get("GOOGLE_PROJECT_ID"),
            auth_uri: get("GOOGLE_AUTH_URI").unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: get("GOOGLE_TOKEN_URI").unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            redirect_uris,
            deployment,
            local_redirect_uri: get("GOOGLE_REDIRECT_URI_LOCAL")
                .unwrap_or_else(|| DEFAULT_LOCAL_REDIRECT_URI.to_string()),
            hosted_redirect_uri: get("GOOGLE_REDIRECT_URI_HOSTED"),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        if config.deployment == DeploymentEnv::Production && config.hosted_redirect_uri.is_none() {
            return Err(AuthError::MissingConfig(
                "GOOGLE_REDIRECT_URI_HOSTED".to_string(),
            ));
        }

        let redirect = Url::parse(config.web_redirect_uri()).map_err(|e| {
            AuthError::InvalidConfig(format!("web redirect URI '{}': {}", config.web_redirect_uri(), e))
        })?;
        let callback_path = redirect.path();
        if RESERVED_WEB_PATHS.contains(&callback_path) || callback_path.contains(&[':', '*'][..]) {
            return Err(AuthError::InvalidConfig(format!(
                "web redirect URI path '{}' cannot be used as the OAuth callback route",
                callback_path
            )));
        }

        Ok(config)
    }

    /// Redirect URI registered for the web flow in the current deployment.
    pub fn web_redirect_uri(&self) -> &str {
        match (self.deployment, &self.hosted_redirect_uri) {
            (DeploymentEnv::Production, Some(uri)) => uri,
            _ => &self.local_redirect_uri,
        }
    }

    /// Path component of the web-flow redirect URI, used as the callback route.
    ///
    /// `from_lookup` has already rejected URIs that fail to parse.
    pub fn web_callback_path(&self) -> String {
        Url::parse(self.web_redirect_uri())
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/oauth2callback".to_string())
    }

    /// Host the local flow puts into its loopback redirect URI.
    pub fn loopback_host(&self) -> String {
        self.redirect_uris
            .first()
            .and_then(|uri| Url::parse(uri).ok())
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Consent-screen URL requesting offline access.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.auth_uri)
            .map_err(|e| AuthError::InvalidConfig(format!("GOOGLE_AUTH_URI: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url.into())
    }
}

/// Random URL-safe token for OAuth `state` values and session ids.
pub fn new_state_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Query string Google appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Pulls the authorization code out of a redirect after checking `state`.
pub fn extract_authorization_code(
    params: &CallbackParams,
    expected_state: &str,
) -> Result<String, AuthError> {
    if let Some(error) = &params.error {
        return Err(AuthError::Callback(error.clone()));
    }

    match params.state.as_deref() {
        Some(state) if state == expected_state => {}
        _ => return Err(AuthError::StateMismatch),
    }

    params
        .code
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::Callback("missing authorization code".to_string()))
}
