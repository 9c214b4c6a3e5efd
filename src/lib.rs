//! Toolgate: OAuth 2.1 authorization server guarding a remote tool endpoint.
//!
//! Issues PKCE-protected authorization codes, rotating refresh tokens and
//! resource-bound bearer tokens, and verifies those tokens in front of the
//! protected resource.

pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
