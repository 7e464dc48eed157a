// Web redirect authorization, scoped to one browser session.
//
// A provider is built per request from the session cookie. When the session
// holds no usable credential, `credential()` fails with `RedirectRequired`
// and the web layer sends the browser to Google; the callback route then
// calls `complete_authorization` with the returned code.

use std::sync::Arc;

use async_trait::async_trait;

use super::oauth_client::GoogleOAuthClient;
use super::oauth_config::{
    extract_authorization_code, new_state_token, CallbackParams, OAuthClientConfig,
};
use super::session_store::{SessionCredentialStore, SessionStore};
use crate::core::auth::{AuthError, Credential, CredentialProvider, CredentialService, TokenExchanger};

pub struct WebRedirectProvider<T: TokenExchanger = GoogleOAuthClient> {
    service: CredentialService<SessionCredentialStore, T>,
    sessions: Arc<SessionStore>,
    session_id: String,
    config: Arc<OAuthClientConfig>,
}

impl<T: TokenExchanger> WebRedirectProvider<T> {
    pub fn for_session(
        config: Arc<OAuthClientConfig>,
        sessions: Arc<SessionStore>,
        exchanger: T,
        session_id: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        let store = SessionCredentialStore::new(Arc::clone(&sessions), session_id.clone());
        Self {
            service: CredentialService::new(store, exchanger),
            sessions,
            session_id,
            config,
        }
    }

    /// Records a fresh `state` in the session and returns the consent URL.
    pub fn begin_authorization(&self) -> Result<String, AuthError> {
        let state = new_state_token();
        let url = self
            .config
            .authorization_url(self.config.web_redirect_uri(), &state)?;
        self.sessions.set_state(&self.session_id, state);
        Ok(url)
    }

    /// Handles the OAuth callback query for this session.
    pub async fn complete_authorization(&self, params: &CallbackParams) -> Result<Credential, AuthError> {
        let expected = self
            .sessions
            .take_state(&self.session_id)
            .ok_or(AuthError::StateMismatch)?;
        let code = extract_authorization_code(params, &expected)?;

        self.service
            .complete_authorization(&code, self.config.web_redirect_uri())
            .await
    }
}

#[async_trait]
impl<T: TokenExchanger> CredentialProvider for WebRedirectProvider<T> {
    async fn credential(&self) -> Result<Credential, AuthError> {
        match self.service.current().await {
            Err(AuthError::AuthorizationRequired) => Err(AuthError::RedirectRequired {
                authorization_url: self.begin_authorization()?,
            }),
            other => other,
        }
    }
}
