//! Main router configuration assembling the OAuth, discovery and protected resource endpoints.

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use super::{
    context::AppState,
    handler_oauth::{
        handle_oauth_authorize, handle_oauth_authorize_form, handle_oauth_revoke,
        handle_oauth_token,
    },
    handler_oauth_clients::handle_register_client,
    handler_resource::handle_protected_resource,
    handler_well_known::{oauth_authorization_server_handler, oauth_protected_resource_handler},
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    let well_known_routes = Router::new()
        .route(
            "/oauth-protected-resource",
            get(oauth_protected_resource_handler),
        )
        .route(
            "/oauth-protected-resource/{*path}",
            get(oauth_protected_resource_handler),
        )
        .route(
            "/oauth-authorization-server",
            get(oauth_authorization_server_handler),
        );

    let cors = cors_layer(ctx.config.cors_allowed_origins.as_ref());

    Router::new()
        .route("/register", post(handle_register_client))
        .route(
            "/authorize",
            get(handle_oauth_authorize).post(handle_oauth_authorize_form),
        )
        .route("/token", post(handle_oauth_token))
        .route("/revoke", post(handle_oauth_revoke))
        .route(
            &ctx.config.resource_path(),
            get(handle_protected_resource).post(handle_protected_resource),
        )
        .nest("/.well-known", well_known_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// CORS for browser-based clients; any origin when none are configured
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let any_origin = allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*");
    let allow_origin = if any_origin {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(origin = %origin, error = %err, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::WWW_AUTHENTICATE])
}
