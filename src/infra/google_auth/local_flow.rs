// Installed-app ("local interactive") authorization.
//
// Binds a loopback listener on an ephemeral port, prints the consent URL,
// and waits for Google to redirect the browser back with a code. The
// credential is kept in the token file so later runs skip the browser.
//
// The listener is a small axum app. hyper serves every connection on its own
// task, so a browser preconnect that never sends a request cannot hold up
// the real redirect.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

use super::oauth_client::GoogleOAuthClient;
use super::oauth_config::{
    extract_authorization_code, new_state_token, CallbackParams, OAuthClientConfig,
};
use super::token_file_store::TokenFileStore;
use crate::core::auth::{AuthError, Credential, CredentialProvider, CredentialService};

const SUCCESS_PAGE: &str =
    "<html><body><p>The authentication flow has completed. You may close this window.</p></body></html>";
const FAILURE_PAGE: &str =
    "<html><body><p>Authorization failed. Check the terminal for details.</p></body></html>";

pub struct LocalInteractiveProvider {
    service: CredentialService<TokenFileStore, GoogleOAuthClient>,
    config: Arc<OAuthClientConfig>,
}

impl LocalInteractiveProvider {
    pub fn new(config: Arc<OAuthClientConfig>, token_path: impl AsRef<Path>) -> Self {
        let exchanger = GoogleOAuthClient::new(Arc::clone(&config));
        Self {
            service: CredentialService::new(TokenFileStore::new(token_path), exchanger),
            config,
        }
    }

    /// Runs the browser consent flow and persists the result.
    pub async fn authorize_interactively(&self) -> Result<Credential, AuthError> {
        let (listener, redirect_uri) = bind_loopback(&self.config.loopback_host()).await?;
        let state = new_state_token();
        let url = self.config.authorization_url(&redirect_uri, &state)?;

        println!("Please visit this URL to authorize this application:\n{}", url);
        tracing::info!("Waiting for OAuth redirect on {}", redirect_uri);

        let code = wait_for_code(listener, &state).await?;
        self.service.complete_authorization(&code, &redirect_uri).await
    }
}

/// Binds an ephemeral port on `host` and returns the redirect URI that points at it.
async fn bind_loopback(host: &str) -> Result<(TcpListener, String), AuthError> {
    // `Url::host_str` keeps the brackets around IPv6 literals.
    let bind_host = host.trim_start_matches('[').trim_end_matches(']');
    let listener = TcpListener::bind((bind_host, 0)).await.map_err(|e| {
        AuthError::Callback(format!("failed to bind loopback listener on {}: {}", host, e))
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| AuthError::Callback(e.to_string()))?
        .port();

    Ok((listener, format!("http://{}:{}/", host, port)))
}

type CodeSender = oneshot::Sender<Result<String, AuthError>>;

#[derive(Clone)]
struct LoopbackState {
    expected_state: Arc<str>,
    result: Arc<Mutex<Option<CodeSender>>>,
}

async fn redirect_handler(
    State(state): State<LoopbackState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    let outcome = extract_authorization_code(&params, &state.expected_state);
    let page = match &outcome {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)),
        Err(e) => {
            tracing::warn!("OAuth redirect rejected: {}", e);
            (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
        }
    };

    if let Some(sender) = state.result.lock().await.take() {
        let _ = sender.send(outcome);
    }
    page
}

/// Serves the loopback listener until a request hits `/`, then returns its code.
///
/// Browsers also ask for /favicon.ico and the like; those get a 404.
async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String, AuthError> {
    let (result_tx, result_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/", get(redirect_handler))
        .with_state(LoopbackState {
            expected_state: Arc::from(expected_state),
            result: Arc::new(Mutex::new(Some(result_tx))),
        });

    // The server task is not joined: idle connections may keep it alive
    // after the shutdown signal, and it dies with the runtime anyway.
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            tracing::warn!("Loopback listener stopped: {}", e);
        }
    });

    let outcome = result_rx
        .await
        .map_err(|_| AuthError::Callback("loopback listener stopped before the redirect".to_string()))?;
    let _ = shutdown_tx.send(());
    outcome
}

#[async_trait]
impl CredentialProvider for LocalInteractiveProvider {
    async fn credential(&self) -> Result<Credential, AuthError> {
        match self.service.current().await {
            Err(AuthError::AuthorizationRequired) => self.authorize_interactively().await,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use url::Url;

    async fn send(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(
                format!(
                    "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
                    target
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn loopback_listener_returns_code_and_skips_other_paths() {
        let (listener, port) = listener().await;

        let client = tokio::spawn(async move {
            let favicon = send(port, "/favicon.ico").await;
            let callback = send(port, "/?state=expected&code=4%2Fabc").await;
            (favicon, callback)
        });

        let code = wait_for_code(listener, "expected").await.unwrap();
        let (favicon, callback) = client.await.unwrap();

        assert_eq!(code, "4/abc");
        assert!(favicon.starts_with("HTTP/1.1 404"));
        assert!(callback.starts_with("HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn loopback_listener_rejects_wrong_state() {
        let (listener, port) = listener().await;

        let client = tokio::spawn(async move { send(port, "/?state=forged&code=x").await });

        let result = wait_for_code(listener, "expected").await;
        let response = client.await.unwrap();

        assert!(matches!(result, Err(AuthError::StateMismatch)));
        assert!(response.starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn idle_connection_does_not_block_the_redirect() {
        let (listener, port) = listener().await;

        // Like a browser preconnect: opened first, never sends a byte.
        let idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let client = tokio::spawn(async move { send(port, "/?state=s&code=c").await });

        let code = tokio::time::timeout(Duration::from_secs(5), wait_for_code(listener, "s"))
            .await
            .expect("redirect was blocked by the idle connection")
            .unwrap();

        assert_eq!(code, "c");
        assert!(client.await.unwrap().starts_with("HTTP/1.1 200"));
        drop(idle);
    }

    #[tokio::test]
    async fn redirect_uri_points_at_the_bound_listener() {
        let (listener, redirect_uri) = bind_loopback("127.0.0.1").await.unwrap();
        let bound = listener.local_addr().unwrap();
        let redirect = Url::parse(&redirect_uri).unwrap();

        assert_eq!(redirect.host_str(), Some("127.0.0.1"));
        assert_eq!(redirect.port(), Some(bound.port()));
        assert_eq!(bound.ip().to_string(), "127.0.0.1");
        assert_eq!(redirect.path(), "/");
    }

    #[tokio::test]
    async fn localhost_redirect_is_served_by_a_loopback_listener() {
        let (listener, redirect_uri) = bind_loopback("localhost").await.unwrap();
        let bound = listener.local_addr().unwrap();

        assert!(bound.ip().is_loopback());
        assert_eq!(redirect_uri, format!("http://localhost:{}/", bound.port()));
    }
}
