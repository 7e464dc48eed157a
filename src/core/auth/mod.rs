pub mod auth_models;
pub mod auth_service;

pub use auth_models::{AuthError, Credential, TokenGrant, SCOPES};
pub use auth_service::{CredentialProvider, CredentialService, CredentialStore, TokenExchanger};
