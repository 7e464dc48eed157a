// Redirect-flow front end.
//
// Routes:
// - `GET <callback>` - path of the configured redirect URI; finishes the exchange
// - `GET /authorize` - starts a session if needed and redirects to Google
// - `GET /` - generates the document for this session; a browser without a
//   live session is sent to `/authorize` first
//
// Each request gets its own `WebRedirectProvider` built from the session
// cookie, so no authorization state is shared between browsers. Sessions are
// only created by `/authorize`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tokio::net::TcpListener;

use crate::core::auth::{AuthError, TokenExchanger};
use crate::core::doc_generation::{DocGenerationError, DocGenerationService, DocumentApi, IboRecord};
use crate::infra::google_auth::{
    CallbackParams, OAuthClientConfig, SessionStore, WebRedirectProvider, SESSION_COOKIE,
};

pub struct WebApp<A: DocumentApi, T: TokenExchanger + Clone> {
    config: Arc<OAuthClientConfig>,
    sessions: Arc<SessionStore>,
    exchanger: T,
    generator: DocGenerationService<A>,
    input_path: PathBuf,
}

impl<A, T> WebApp<A, T>
where
    A: DocumentApi + 'static,
    T: TokenExchanger + Clone + 'static,
{
    pub fn new(
        config: Arc<OAuthClientConfig>,
        exchanger: T,
        generator: DocGenerationService<A>,
        input_path: PathBuf,
        sessions: SessionStore,
    ) -> Self {
        Self {
            config,
            sessions: Arc::new(sessions),
            exchanger,
            generator,
            input_path,
        }
    }

    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            "Listening on http://{} (callback route {})",
            listener.local_addr()?,
            self.config.web_callback_path()
        );

        axum::serve(listener, self.router()).await
    }

    /// The callback is registered first; `OAuthClientConfig` refuses callback
    /// paths that collide with the other two routes.
    pub fn router(self: Arc<Self>) -> Router {
        let callback_path = self.config.web_callback_path();
        Router::new()
            .route(&callback_path, get(callback::<A, T>))
            .route("/authorize", get(authorize::<A, T>))
            .route("/", get(index::<A, T>))
            .with_state(self)
    }

    /// The session named by the cookie, if it exists and has not expired.
    fn live_session(&self, jar: &CookieJar) -> Option<String> {
        jar.get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|id| self.sessions.touch(id))
    }

    fn provider(&self, session_id: &str) -> WebRedirectProvider<T> {
        WebRedirectProvider::for_session(
            Arc::clone(&self.config),
            Arc::clone(&self.sessions),
            self.exchanger.clone(),
            session_id,
        )
    }
}

type AppState<A, T> = State<Arc<WebApp<A, T>>>;

async fn authorize<A, T>(State(app): AppState<A, T>, jar: CookieJar) -> Response
where
    A: DocumentApi + 'static,
    T: TokenExchanger + Clone + 'static,
{
    let (session_id, jar) = match app.live_session(&jar) {
        Some(id) => (id, jar),
        None => {
            let id = app.sessions.create();
            let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
                .http_only(true)
                .same_site(SameSite::Lax)
                .path("/");
            (id, jar.add(cookie))
        }
    };

    match app.provider(&session_id).begin_authorization() {
        Ok(url) => (jar, found(&url)).into_response(),
        Err(e) => (jar, error_page(&e.to_string())).into_response(),
    }
}

async fn callback<A, T>(
    State(app): AppState<A, T>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response
where
    A: DocumentApi + 'static,
    T: TokenExchanger + Clone + 'static,
{
    let Some(session_id) = app.live_session(&jar) else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<p>No active session. Start again at <a href=\"/authorize\">/authorize</a>.</p>"),
        )
            .into_response();
    };

    match app.provider(&session_id).complete_authorization(&params).await {
        Ok(_) => {
            tracing::info!("Session authorized");
            found("/")
        }
        Err(e) => {
            tracing::error!("OAuth callback failed: {}", e);
            app.sessions.remove(&session_id);
            (
                StatusCode::BAD_REQUEST,
                Html(format!("<p>Authorization failed: {}</p>", escape_html(&e.to_string()))),
            )
                .into_response()
        }
    }
}

async fn index<A, T>(State(app): AppState<A, T>, jar: CookieJar) -> Response
where
    A: DocumentApi + 'static,
    T: TokenExchanger + Clone + 'static,
{
    let Some(session_id) = app.live_session(&jar) else {
        return found("/authorize");
    };
    let provider = app.provider(&session_id);

    let record = match IboRecord::load(&app.input_path).await {
        Ok(record) => record,
        Err(e) => return error_page(&e.to_string()),
    };

    match app.generator.generate(&provider, &record).await {
        Ok(doc) => {
            let url = escape_html(&doc.url);
            let mut body = format!(
                "<p>Your document is ready: <a href=\"{url}\">{url}</a></p>",
                url = url
            );
            for warning in &doc.warnings {
                body.push_str(&format!(
                    "<p>Warning ({}): {}</p>",
                    warning.step,
                    escape_html(&warning.message)
                ));
            }
            Html(body).into_response()
        }
        Err(DocGenerationError::Auth(AuthError::RedirectRequired { authorization_url })) => {
            found(&authorization_url)
        }
        Err(e) => {
            tracing::error!("Document generation failed: {}", e);
            error_page(&e.to_string())
        }
    }
}

/// 302 redirect; `axum::response::Redirect` only offers 303/307/308.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn error_page(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("<p>Error: {}</p>", escape_html(message))),
    )
        .into_response()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
