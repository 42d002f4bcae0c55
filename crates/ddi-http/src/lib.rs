//! DDI HTTP server: a minimal web UI and JSON API over the credential orchestrator.
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;
pub mod views;

/// Default port for the web UI.
pub const DEFAULT_PORT: u16 = 3010;
