// Credential lifecycle rules shared by every authorization flow.
//
// The service decides *whether* a stored credential can be used as-is,
// must be refreshed, or needs a fresh authorization. How the user is sent
// through the consent screen is up to each `CredentialProvider`.

use async_trait::async_trait;
use chrono::Utc;

use super::auth_models::{AuthError, Credential, TokenGrant};

// ============================================================================
// PORTS
// ============================================================================

/// Where a credential is persisted between runs or requests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, AuthError>;
    async fn save(&self, credential: &Credential) -> Result<(), AuthError>;
    async fn clear(&self) -> Result<(), AuthError>;
}

/// The OAuth2 token endpoint.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Anything that can hand out a usable bearer credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self) -> Result<Credential, AuthError>;
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct CredentialService<S: CredentialStore, T: TokenExchanger> {
    store: S,
    exchanger: T,
}

impl<S, T> CredentialService<S, T>
where
    S: CredentialStore,
    T: TokenExchanger,
{
    pub fn new(store: S, exchanger: T) -> Self {
        Self { store, exchanger }
    }

    /// Returns the stored credential, refreshing it when needed.
    ///
    /// Fails with [`AuthError::AuthorizationRequired`] when nothing usable is
    /// stored and the caller has to run an authorization flow.
    pub async fn current(&self) -> Result<Credential, AuthError> {
        let Some(stored) = self.store.load().await? else {
            return Err(AuthError::AuthorizationRequired);
        };

        if stored.is_valid() {
            return Ok(stored);
        }

        let Some(refresh_token) = stored.refresh_token.clone().filter(|_| stored.can_refresh())
        else {
            tracing::info!("Stored credential expired and has no refresh token");
            return Err(AuthError::AuthorizationRequired);
        };

        match self.exchanger.refresh(&refresh_token).await {
            Ok(grant) => {
                let refreshed = Credential::from_grant(grant, Some(refresh_token), Utc::now());
                self.store.save(&refreshed).await?;
                tracing::info!("Refreshed access token");
                Ok(refreshed)
            }
            Err(AuthError::InvalidGrant(reason)) => {
                // A revoked refresh token can only be fixed by authorizing again.
                tracing::warn!("Refresh token rejected: {}", reason);
                self.store.clear().await?;
                Err(AuthError::AuthorizationRequired)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, keeping stored credential: {}", e);
                Err(e)
            }
        }
    }

    /// Exchanges an authorization code and persists the resulting credential.
    pub async fn complete_authorization(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let grant = self.exchanger.exchange_code(code, redirect_uri).await?;
        let credential = Credential::from_grant(grant, None, Utc::now());
        self.store.save(&credential).await?;
        tracing::info!("Stored new credential");
        Ok(credential)
    }
}
