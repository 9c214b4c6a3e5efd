//! In-memory storage implementations
//!
//! State lives only as long as the process. A restart drops every client,
//! code and token.

mod oauth;

pub use oauth::MemoryOAuthStorage;
