//! Handles /authorize, /token and /revoke.

use axum::{
    Form,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use super::context::AppState;
use crate::errors::OAuthError;
use crate::oauth::{
    auth_server::{AuthorizeQuery, TokenForm, extract_client_auth},
    types::{AuthorizationRequest, TokenRequest},
};

/// GET /authorize
///
/// Redirects to the client with a fresh code, or answers 400 when the
/// request does not validate. No consent step is shown.
pub async fn handle_oauth_authorize(
    State(state): State<AppState>,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(query)) => authorize(&state, query).await,
        Err(rejection) => OAuthError::InvalidRequest(rejection.body_text()).into_response(),
    }
}

/// POST /authorize with the same parameters as a form body
pub async fn handle_oauth_authorize_form(
    State(state): State<AppState>,
    form: Result<Form<AuthorizeQuery>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(query)) => authorize(&state, query).await,
        Err(rejection) => OAuthError::InvalidRequest(rejection.body_text()).into_response(),
    }
}

async fn authorize(state: &AppState, query: AuthorizeQuery) -> Response {
    let result = match AuthorizationRequest::try_from(query) {
        Ok(request) => state.authorization_server.authorize(request).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(response) => (
            StatusCode::FOUND,
            [(header::LOCATION, response.redirect_url)],
        )
            .into_response(),
        Err(err) => {
            tracing::debug!(error = %err, "authorization request rejected");
            err.into_response()
        }
    }
}

/// POST /token
///
/// Exchanges an authorization code or rotates a refresh token.
pub async fn handle_oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(form) = form.map_err(|rejection| OAuthError::InvalidRequest(rejection.body_text()))?;

    let client_auth = extract_client_auth(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    );
    let request = TokenRequest::try_from(form)?;

    let response = state
        .authorization_server
        .token(request, client_auth)
        .await?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response())
}

/// Form data for the revocation endpoint
#[derive(Debug, Default, Deserialize)]
pub struct RevokeForm {
    pub token: Option<String>,
}

/// POST /revoke
///
/// Always answers 200, whether or not anything was revoked.
pub async fn handle_oauth_revoke(
    State(state): State<AppState>,
    form: Result<Form<RevokeForm>, FormRejection>,
) -> StatusCode {
    let token = match form {
        Ok(Form(RevokeForm { token: Some(token) })) if !token.is_empty() => token,
        _ => return StatusCode::OK,
    };

    if let Err(err) = state.authorization_server.revoke(&token).await {
        tracing::error!(error = %err, "token revocation failed");
    }

    StatusCode::OK
}
