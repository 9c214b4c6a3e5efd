//! OAuth 2.1 authorization server, bearer verifier and client registry.

pub mod auth_server;
pub mod clients;
pub mod resource;
pub mod resource_server;
pub mod types;

// Re-export frequently used items from each module
pub use crate::storage::{
    inmemory::MemoryOAuthStorage,
    traits::{
        AccessTokenStore, AuthorizationCodeStore, OAuthClientStore, OAuthStorage, RefreshTokenStore,
    },
};
pub use auth_server::{
    AuthorizationServer, AuthorizeQuery, AuthorizeResponse, ClientAuthentication, TokenForm,
    TokenLifetimes, extract_client_auth, verify_pkce,
};
pub use clients::{ClientRegistrationService, SeedClient};
pub use resource::{ResourcePolicy, canonicalize_resource_uri};
pub use resource_server::{AuthInfo, ResourceServer, WwwAuthenticate, extract_access_token};
pub use types::{
    AccessToken, AuthorizationCode, AuthorizationRequest, ClientAuthMethod,
    ClientRegistrationRequest, ClientRegistrationResponse, CodeChallengeMethod, Expires,
    GrantType, OAuthClient, OAuthErrorResponse, RefreshToken, ResponseType, TokenRequest,
    TokenResponse, TokenType, parse_scope,
};
