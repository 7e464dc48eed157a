// Google OAuth2 infra.
// - `oauth_config.rs` reads client settings from the environment.
// - `oauth_client.rs` talks to the token endpoint.
// - `token_file_store.rs` / `session_store.rs` persist credentials.
// - `local_flow.rs`, `web_flow.rs`, `service_account.rs` are the credential providers.

pub mod local_flow;
pub mod oauth_client;
pub mod oauth_config;
pub mod service_account;
pub mod session_store;
pub mod token_file_store;
pub mod web_flow;

pub use local_flow::LocalInteractiveProvider;
pub use oauth_client::GoogleOAuthClient;
pub use oauth_config::{AuthFlow, CallbackParams, OAuthClientConfig};
pub use service_account::ServiceAccountProvider;
pub use session_store::{SessionStore, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_MINUTES, SESSION_COOKIE};
pub use web_flow::WebRedirectProvider;
