// =============================================================================
// GOOGLE DOCS MODULE
// =============================================================================
//
// HTTP access to Google Drive and Google Docs for the generation pipeline.
//
// **Architecture:**
// This module lives in the infra layer because it handles external I/O.
// The core layer only knows the `DocumentApi` trait; it does not care that
// the document lives in Drive.

pub mod google_docs_client;

pub use google_docs_client::GoogleWorkspaceClient;
