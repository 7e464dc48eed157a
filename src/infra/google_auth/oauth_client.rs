use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::oauth_config::OAuthClientConfig;
use crate::core::auth::{AuthError, TokenExchanger, TokenGrant};

/// Error body of a rejected token request (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Maps a non-2xx token response, singling out `invalid_grant`.
fn token_error(status: reqwest::StatusCode, text: &str) -> AuthError {
    match serde_json::from_str::<TokenErrorBody>(text) {
        Ok(body) if body.error == "invalid_grant" => {
            AuthError::InvalidGrant(body.error_description.unwrap_or(body.error))
        }
        _ => AuthError::TokenEndpoint(format!("Token exchange failed ({}): {}", status, text)),
    }
}

/// Talks to Google's OAuth2 token endpoint.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client: Client,
    config: Arc<OAuthClientConfig>,
}

impl GoogleOAuthClient {
    pub fn new(config: Arc<OAuthClientConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        let response = self
            .client
            .post(&self.config.token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::TokenEndpoint(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(token_error(status, &text));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| AuthError::TokenEndpoint(e.to_string()))
    }
}

#[async_trait]
impl TokenExchanger for GoogleOAuthClient {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, AuthError> {
        tracing::debug!("Exchanging authorization code at {}", self.config.token_uri);
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        tracing::debug!("Refreshing access token at {}", self.config.token_uri);
        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(mock_server: &MockServer) -> GoogleOAuthClient {
        let token_uri = format!("{}/token", mock_server.uri());
        let config = OAuthClientConfig::from_lookup(|key| match key {
            "GOOGLE_CLIENT_ID" => Some("cid".to_string()),
            "GOOGLE_CLIENT_SECRET" => Some("shh".to_string()),
            "GOOGLE_TOKEN_URI" => Some(token_uri.clone()),
            _ => None,
        })
        .unwrap();
        GoogleOAuthClient::new(Arc::new(config))
    }

    #[tokio::test]
    async fn code_exchange_posts_the_authorization_code_form() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=4%2Fabc"))
            .and(body_string_contains("client_id=cid"))
            .and(body_string_contains("client_secret=shh"))
            .and(body_string_contains("redirect_uri=http%3A%2F%2Flocalhost%3A5000%2F"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599,
                "refresh_token": "1//new",
                "scope": "https://www.googleapis.com/auth/drive",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let grant = client_for(&mock_server)
            .exchange_code("4/abc", "http://localhost:5000/")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "ya29.fresh");
        assert_eq!(grant.refresh_token.as_deref(), Some("1//new"));
        assert_eq!(grant.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn refresh_posts_the_refresh_token_form() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=1%2F%2Fkeep"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.refreshed",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let grant = client_for(&mock_server).refresh("1//keep").await.unwrap();
        assert_eq!(grant.access_token, "ya29.refreshed");
        assert_eq!(grant.refresh_token, None);
    }

    #[tokio::test]
    async fn invalid_grant_is_told_apart_from_other_failures() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("refresh_token=revoked"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("refresh_token=flaky"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);

        assert!(matches!(
            client.refresh("revoked").await,
            Err(AuthError::InvalidGrant(ref reason)) if reason == "Token has been expired or revoked."
        ));
        assert!(matches!(
            client.refresh("flaky").await,
            Err(AuthError::TokenEndpoint(ref e)) if e.contains("503") && e.contains("backend unavailable")
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_token_endpoint_error() {
        // Grab a free port, then close it so the connection is refused.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let token_uri = format!("http://127.0.0.1:{}/token", port);
        let config = OAuthClientConfig::from_lookup(|key| match key {
            "GOOGLE_CLIENT_ID" => Some("cid".to_string()),
            "GOOGLE_CLIENT_SECRET" => Some("shh".to_string()),
            "GOOGLE_TOKEN_URI" => Some(token_uri.clone()),
            _ => None,
        })
        .unwrap();

        let client = GoogleOAuthClient::new(Arc::new(config));
        assert!(matches!(
            client.refresh("1//keep").await,
            Err(AuthError::TokenEndpoint(_))
        ));
    }
}
