//! Application state shared by every request handler.

use anyhow::Result;
use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Config;
use crate::oauth::{
    auth_server::{AuthorizationServer, TokenLifetimes},
    clients::registration::ClientRegistrationService,
    resource::ResourcePolicy,
    resource_server::ResourceServer,
};
use crate::storage::inmemory::MemoryOAuthStorage;
use crate::storage::traits::OAuthStorage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// OAuth storage for tokens, clients, and codes
    pub oauth_storage: Arc<dyn OAuthStorage>,
    /// Client registration service for dynamic client registration
    pub client_registration_service: Arc<ClientRegistrationService>,
    /// Authorization, token and revocation logic
    pub authorization_server: Arc<AuthorizationServer>,
    /// Bearer verification for the protected resource
    pub resource_server: Arc<ResourceServer>,
}

impl AppState {
    /// Assemble the services over a fresh in-memory store
    pub fn from_config(config: Config) -> Result<Self> {
        Self::with_storage(config, Arc::new(MemoryOAuthStorage::new()))
    }

    /// Assemble the services over the given store
    pub fn with_storage(config: Config, oauth_storage: Arc<dyn OAuthStorage>) -> Result<Self> {
        let resource_policy =
            ResourcePolicy::new(config.resource_uri.as_ref(), config.strict_resource)?;

        let mut client_registration_service = ClientRegistrationService::new(
            oauth_storage.clone(),
            config.oauth_supported_scopes.as_ref().clone(),
        )
        .with_max_redirect_uris(config.max_redirect_uris);
        if !config.enable_client_registration {
            client_registration_service = client_registration_service.disable_registration();
        }

        let authorization_server = AuthorizationServer::new(
            oauth_storage.clone(),
            config.external_base.clone(),
            resource_policy.clone(),
        )
        .with_lifetimes(TokenLifetimes {
            authorization_code: *config.authorization_code_expiration.as_ref(),
            access_token: *config.access_token_expiration.as_ref(),
            refresh_token: *config.refresh_token_expiration.as_ref(),
        });

        let resource_server = ResourceServer::new(
            oauth_storage.clone(),
            resource_policy,
            config.resource_metadata_url(),
        )
        .with_required_scopes(config.resource_required_scopes.as_ref().clone());

        Ok(Self {
            config: Arc::new(config),
            oauth_storage,
            client_registration_service: Arc::new(client_registration_service),
            authorization_server: Arc::new(authorization_server),
            resource_server: Arc::new(resource_server),
        })
    }
}

impl FromRef<AppState> for Arc<ResourceServer> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.resource_server.clone()
    }
}

impl FromRef<AppState> for Arc<AuthorizationServer> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.authorization_server.clone()
    }
}
