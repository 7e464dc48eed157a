// Web layer - the HTTP front end for the redirect authorization flow.

#[path = "server.rs"]
pub mod server;

pub use server::WebApp;
