//! Bearer authentication for the protected resource.
//!
//! Rejections carry a `WWW-Authenticate` challenge pointing clients at the
//! protected resource metadata, so an unauthenticated caller can discover
//! where to obtain a token.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use http::request::Parts;

use crate::errors::OAuthError;
use crate::http::AppState;
use crate::oauth::resource_server::{AuthInfo, ResourceServer, extract_access_token};

/// Authenticated caller extractor for protected endpoints
///
/// Verifies the bearer access token against the token store, the resource
/// binding policy and the required scopes.
///
/// # Example
///
/// ```ignore
/// use axum::{routing::get, Json, Router};
/// use toolgate::http::middleware_auth::ExtractedAuth;
///
/// async fn protected_handler(ExtractedAuth(auth): ExtractedAuth) -> String {
///     format!("Hello, client {}", auth.client_id)
/// }
///
/// let app = Router::new().route("/mcp", get(protected_handler));
/// ```
#[derive(Clone, Debug)]
pub struct ExtractedAuth(pub AuthInfo);

/// Build a challenge response for a failed request.
///
/// `presented` is false when the request carried no bearer token; the header
/// then only names the resource metadata.
fn challenge_response(
    resource_server: &ResourceServer,
    error: OAuthError,
    presented: bool,
) -> Response {
    let status = error.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return error.into_response();
    }

    let challenge = resource_server.www_authenticate(presented.then_some(&error));
    (
        status,
        [(header::WWW_AUTHENTICATE, challenge)],
        Json(error.to_response_body()),
    )
        .into_response()
}

impl<S> FromRequestParts<S> for ExtractedAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let resource_server = &app_state.resource_server;

        let Some(token) = extract_access_token(&parts.headers) else {
            return Err(challenge_response(
                resource_server,
                OAuthError::InvalidToken("Authentication required".to_string()),
                false,
            ));
        };

        match resource_server.authorize(&token).await {
            Ok(auth_info) => Ok(ExtractedAuth(auth_info)),
            Err(err) => {
                tracing::debug!(error = %err, "bearer authentication failed");
                Err(challenge_response(resource_server, err, true))
            }
        }
    }
}
