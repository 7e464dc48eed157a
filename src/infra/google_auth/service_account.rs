// =============================================================================
// SERVICE ACCOUNT AUTHENTICATION
// =============================================================================
//
// Headless alternative to the user flows: no browser, no token file.
//
// **Setup:**
// 1. Create a service account in Google Cloud Console and enable the
//    Drive and Docs APIs for the project
// 2. Create a JSON key for it
// 3. Set one of:
//    - `GOOGLE_SERVICE_ACCOUNT_KEY` - Path to the JSON key file
//    - `GOOGLE_SERVICE_ACCOUNT_JSON` - The JSON content directly (for deployment)
//
// Documents are created in the service account's own Drive. They are still
// shared publicly at the end of the pipeline, so the link works for anyone.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::auth::{AuthError, Credential, CredentialProvider, TokenGrant, SCOPES};

/// Tokens are reused for this long even though Google issues them for an hour.
const CACHE_MINUTES: i64 = 55;

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    /// The service account email (used as issuer in JWT).
    client_email: String,

    /// The private key in PEM format.
    private_key: String,

    /// The token URI (where to exchange JWT for access token).
    token_uri: String,
}

/// JWT claims for Google OAuth2.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    /// Max 1 hour from iat.
    exp: i64,
}

pub struct ServiceAccountProvider {
    key: ServiceAccountKey,
    client: Client,
    cached: Arc<RwLock<Option<Credential>>>,
}

impl ServiceAccountProvider {
    pub async fn from_file(path: &str) -> Result<Self, AuthError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuthError::InvalidConfig(format!("{}: {}", path, e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidConfig(format!("service account key: {}", e)))?;
        Ok(Self {
            key,
            client: Client::new(),
            cached: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn from_env() -> Result<Self, AuthError> {
        if let Ok(path) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            return Self::from_file(&path).await;
        }

        if let Ok(json) = std::env::var("GOOGLE_SERVICE_ACCOUNT_JSON") {
            return Self::from_json(&json);
        }

        Err(AuthError::MissingConfig(
            "GOOGLE_SERVICE_ACCOUNT_KEY or GOOGLE_SERVICE_ACCOUNT_JSON".to_string(),
        ))
    }

    fn claims(&self, now: DateTime<Utc>) -> JwtClaims {
        let iat = now.timestamp();
        JwtClaims {
            iss: self.key.client_email.clone(),
            scope: SCOPES.join(" "),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + 3600,
        }
    }

    async fn fetch_new_token(&self) -> Result<Credential, AuthError> {
        let now = Utc::now();
        let header = Header::new(Algorithm::RS256);
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidConfig(format!("private key: {}", e)))?;
        let jwt = encode(&header, &self.claims(now), &signing_key)
            .map_err(|e| AuthError::InvalidConfig(format!("JWT signing failed: {}", e)))?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenEndpoint(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint(format!(
                "Token exchange failed ({}): {}",
                status, text
            )));
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| AuthError::TokenEndpoint(e.to_string()))?;

        let mut credential = Credential::from_grant(grant, None, now);
        credential.expiry = Some(now + Duration::minutes(CACHE_MINUTES));
        Ok(credential)
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountProvider {
    async fn credential(&self) -> Result<Credential, AuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(credential) = cached.as_ref().filter(|c| c.is_valid()) {
                return Ok(credential.clone());
            }
        }

        let credential = self.fetch_new_token().await?;
        tracing::info!("Obtained service account token for {}", self.key.client_email);

        *self.cached.write().await = Some(credential.clone());
        Ok(credential)
    }
}
