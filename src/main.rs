// This is the entry point of the document generator.
//
// **Architecture Overview:**
// - `core/` = Business logic (auth state machine, document pipeline)
// - `infra/` = Implementations of core traits (Google APIs, token and session stores)
// - `web/` = Browser front end for the redirect authorization flow
//
// This file's job is to:
// 1. Load configuration
// 2. Pick the credential provider
// 3. Wire the services together and run the chosen command

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "web/web_layer.rs"]
mod web;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::core::auth::CredentialProvider;
use crate::core::doc_generation::{DocGenerationConfig, DocGenerationService, IboRecord};
use crate::infra::google_auth::{
    AuthFlow, GoogleOAuthClient, LocalInteractiveProvider, OAuthClientConfig,
    ServiceAccountProvider, SessionStore, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_MINUTES,
};
use crate::infra::google_docs::GoogleWorkspaceClient;
use crate::web::WebApp;

const DEFAULT_TOKEN_FILE: &str = "token.json";

#[derive(Parser)]
#[command(name = "docgen")]
#[command(about = "Builds a personalized, publicly shared Google Doc from a .docx template", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the document for one record and print its URL
    Generate {
        /// JSON record with ibo_name, ibo_id and shop_links
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// .docx template to upload
        #[arg(long, env = "TEMPLATE_FILE", value_name = "PATH")]
        template: Option<PathBuf>,

        /// Do not publish when any editing step failed
        #[arg(long)]
        strict: bool,
    },

    /// Serve the browser authorization flow; `/` generates the document
    Serve {
        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,

        /// JSON record rendered for every authorized session
        #[arg(long, value_name = "INPUT")]
        input: PathBuf,

        /// .docx template to upload
        #[arg(long, env = "TEMPLATE_FILE", value_name = "PATH")]
        template: Option<PathBuf>,
    },

    /// Authorize through the browser and store the token
    Auth,
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(false)
}

fn token_file() -> PathBuf {
    std::env::var("TOKEN_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOKEN_FILE))
}

fn env_number<N: std::str::FromStr>(key: &str, default: N) -> N {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn session_store() -> SessionStore {
    let idle_minutes = env_number("SESSION_IDLE_MINUTES", DEFAULT_SESSION_IDLE_MINUTES);
    let max_sessions = env_number("MAX_SESSIONS", DEFAULT_MAX_SESSIONS);
    tracing::info!(
        "Sessions expire after {} idle minutes, at most {} kept",
        idle_minutes,
        max_sessions
    );
    SessionStore::with_limits(chrono::Duration::minutes(idle_minutes), max_sessions)
}

fn generation_config(template: Option<PathBuf>, strict: bool) -> DocGenerationConfig {
    let defaults = DocGenerationConfig::default();
    DocGenerationConfig {
        template_path: template.unwrap_or(defaults.template_path),
        document_name: std::env::var("DOC_NAME").unwrap_or(defaults.document_name),
        strict_publish: strict || env_flag("STRICT_PUBLISH"),
    }
}

fn workspace_client() -> GoogleWorkspaceClient {
    match std::env::var("GOOGLE_API_BASE_URL") {
        Ok(base) if !base.trim().is_empty() => {
            tracing::info!("Using Google API base URL {}", base);
            GoogleWorkspaceClient::with_base_url(&base)
        }
        _ => GoogleWorkspaceClient::new(),
    }
}

fn oauth_config() -> anyhow::Result<Arc<OAuthClientConfig>> {
    let config = OAuthClientConfig::from_env().context("OAuth client configuration")?;
    if let Some(project) = &config.project_id {
        tracing::info!("OAuth client for project {}", project);
    }
    Ok(Arc::new(config))
}

async fn credential_provider() -> anyhow::Result<Box<dyn CredentialProvider>> {
    let flow = match std::env::var("AUTH_FLOW") {
        Ok(value) => value.parse::<AuthFlow>()?,
        Err(_) => AuthFlow::LocalInteractive,
    };

    match flow {
        AuthFlow::LocalInteractive => Ok(Box::new(LocalInteractiveProvider::new(
            oauth_config()?,
            token_file(),
        ))),
        AuthFlow::ServiceAccount => Ok(Box::new(ServiceAccountProvider::from_env().await?)),
        AuthFlow::WebRedirect => {
            bail!("AUTH_FLOW=web needs a browser session; run `docgen serve` instead")
        }
    }
}

async fn generate(input: PathBuf, template: Option<PathBuf>, strict: bool) -> anyhow::Result<()> {
    let record = IboRecord::load(&input).await?;
    let provider = credential_provider().await?;
    let service = DocGenerationService::new(workspace_client(), generation_config(template, strict));

    let document = service.generate(provider.as_ref(), &record).await?;

    tracing::info!("Generated document {}", document.document_id);
    for warning in &document.warnings {
        tracing::warn!("{} failed: {}", warning.step, warning.message);
    }
    println!("{}", document.url);
    Ok(())
}

async fn serve(bind: SocketAddr, input: PathBuf, template: Option<PathBuf>) -> anyhow::Result<()> {
    let config = oauth_config()?;
    let exchanger = GoogleOAuthClient::new(Arc::clone(&config));
    let service = DocGenerationService::new(workspace_client(), generation_config(template, false));

    let app = Arc::new(WebApp::new(config, exchanger, service, input, session_store()));
    app.serve(bind).await?;
    Ok(())
}

async fn authorize() -> anyhow::Result<()> {
    let path = token_file();
    let provider = LocalInteractiveProvider::new(oauth_config()?, &path);
    provider.credential().await?;
    println!("Credentials stored in {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            input,
            template,
            strict,
        } => generate(input, template, strict).await,
        Commands::Serve {
            bind,
            input,
            template,
        } => serve(bind, input, template).await,
        Commands::Auth => authorize().await,
    }
}
