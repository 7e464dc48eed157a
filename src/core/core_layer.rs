// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "auth/mod.rs"]
pub mod auth;

#[path = "doc_generation/mod.rs"]
pub mod doc_generation;
