//! Handles the protected resource at the path of the configured resource URI.

use axum::response::Json;

use super::middleware_auth::ExtractedAuth;
use crate::oauth::resource_server::AuthInfo;

/// Echo the verified caller identity back to it
pub async fn handle_protected_resource(ExtractedAuth(auth_info): ExtractedAuth) -> Json<AuthInfo> {
    tracing::debug!(client_id = %auth_info.client_id, "protected resource accessed");
    Json(auth_info)
}
