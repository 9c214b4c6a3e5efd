//! Handles POST /register - Dynamic OAuth client registration per RFC 7591

use axum::{
    extract::{Json, State, rejection::JsonRejection},
    http::StatusCode,
};

use crate::{
    errors::ClientRegistrationError,
    http::context::AppState,
    oauth::types::{ClientRegistrationRequest, ClientRegistrationResponse},
};

pub async fn handle_register_client(
    State(state): State<AppState>,
    payload: Result<Json<ClientRegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ClientRegistrationResponse>), ClientRegistrationError> {
    let Json(request) = payload.map_err(|rejection| {
        ClientRegistrationError::InvalidClientMetadata(rejection.body_text())
    })?;

    let response = state
        .client_registration_service
        .register_client(request)
        .await
        .inspect_err(|err| tracing::debug!(error = %err, "client registration rejected"))?;

    Ok((StatusCode::CREATED, Json(response)))
}
