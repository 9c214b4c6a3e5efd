//! Axum HTTP server handlers and middleware for the OAuth 2.1 endpoints and the protected resource.

pub mod context;
mod handler_oauth;
mod handler_oauth_clients;
mod handler_resource;
mod handler_well_known;
pub mod middleware_auth;
pub mod server;

pub use context::AppState;
pub use server::build_router;
