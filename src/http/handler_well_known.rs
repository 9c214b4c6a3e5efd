//! Handles OAuth 2.0 well-known discovery endpoints - authorization server metadata and protected resource metadata

use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use super::context::AppState;

/// OAuth 2.0 Protected Resource Metadata handler
/// GET /.well-known/oauth-protected-resource
///
/// Returns metadata about the protected resource as specified by RFC 9728.
/// Also served under path-suffixed variants of the same URL.
pub async fn oauth_protected_resource_handler(State(state): State<AppState>) -> Json<Value> {
    let metadata = json!({
        "resource": state.config.resource_uri.as_ref(),
        "authorization_servers": [state.authorization_server.issuer()],
        "scopes_supported": state.config.oauth_supported_scopes.as_ref(),
        "bearer_methods_supported": ["header"],
    });

    Json(metadata)
}

/// OAuth 2.0 Authorization Server Metadata handler
/// GET /.well-known/oauth-authorization-server
///
/// Returns metadata about the OAuth authorization server as specified by RFC 8414.
pub async fn oauth_authorization_server_handler(State(state): State<AppState>) -> Json<Value> {
    let base = state.authorization_server.issuer();
    let mut metadata = json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "revocation_endpoint": format!("{base}/revoke"),
        "scopes_supported": state.config.oauth_supported_scopes.as_ref(),
        "response_types_supported": ["code"],
        "response_modes_supported": ["query"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post", "none"],
        "revocation_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": ["S256", "plain"],
    });

    if state.client_registration_service.registration_enabled() {
        metadata["registration_endpoint"] = Value::String(format!("{base}/register"));
    }

    Json(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashMap;

    fn create_test_app_state(registration: &str) -> AppState {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("EXTERNAL_BASE", "https://auth.example.com"),
            ("OAUTH_SUPPORTED_SCOPES", "mcp:tools mcp:read"),
            ("ENABLE_CLIENT_REGISTRATION", registration),
        ]);
        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        AppState::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn test_oauth_authorization_server_handler() {
        let app_state = create_test_app_state("true");
        let Json(metadata) = oauth_authorization_server_handler(State(app_state)).await;

        assert_eq!(metadata["issuer"], "https://auth.example.com");
        assert_eq!(
            metadata["authorization_endpoint"],
            "https://auth.example.com/authorize"
        );
        assert_eq!(metadata["token_endpoint"], "https://auth.example.com/token");
        assert_eq!(
            metadata["registration_endpoint"],
            "https://auth.example.com/register"
        );
        assert_eq!(metadata["revocation_endpoint"], "https://auth.example.com/revoke");
        assert_eq!(metadata["scopes_supported"], json!(["mcp:tools", "mcp:read"]));
        assert_eq!(metadata["code_challenge_methods_supported"], json!(["S256", "plain"]));
        assert_eq!(
            metadata["grant_types_supported"],
            json!(["authorization_code", "refresh_token"])
        );
    }

    #[tokio::test]
    async fn test_registration_endpoint_hidden_when_disabled() {
        let app_state = create_test_app_state("false");
        let Json(metadata) = oauth_authorization_server_handler(State(app_state)).await;

        assert!(metadata.get("registration_endpoint").is_none());
    }

    #[tokio::test]
    async fn test_oauth_protected_resource_handler() {
        let app_state = create_test_app_state("true");
        let Json(metadata) = oauth_protected_resource_handler(State(app_state)).await;

        assert_eq!(metadata["resource"], "https://auth.example.com/mcp");
        assert_eq!(
            metadata["authorization_servers"],
            json!(["https://auth.example.com"])
        );
        assert_eq!(metadata["bearer_methods_supported"], json!(["header"]));
    }
}
