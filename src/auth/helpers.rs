//! Pure helper functions for authentication
//!
//! URL builders, the outbound HTTP client and the OAuth2 client used by the
//! sign-in flow. Nothing here performs I/O.

use std::time::Duration;

use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    RedirectUrl, TokenUrl,
};

use crate::config::Config;

/// Delegated scopes requested at sign-in
pub const SIGN_IN_SCOPES: [&str; 4] = ["openid", "profile", "email", "User.Read"];

/// OAuth2 client with authorization and token endpoints configured
pub type SignInClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

// =============================================================================
// URL Builders
// =============================================================================

/// Build an identity-provider endpoint URL for a tenant
///
/// `endpoint` is `authorize` or `token`.
pub fn build_authority_url(authority_host: &str, tenant_id: &str, endpoint: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/{}",
        authority_host.trim_end_matches('/'),
        tenant_id,
        endpoint
    )
}

/// Build the Graph profile URL for the signed-in user
pub fn build_profile_url(graph_api_url: &str) -> String {
    format!("{}/v1.0/me", graph_api_url.trim_end_matches('/'))
}

// =============================================================================
// Clients
// =============================================================================

/// Create a reqwest client for outbound HTTP requests using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

/// Initialize the sign-in OAuth2 client from configuration
pub fn create_oauth_client(config: &Config) -> Result<SignInClient, String> {
    let auth_url = AuthUrl::new(build_authority_url(
        &config.authority_host,
        &config.tenant_id,
        "authorize",
    ))
    .map_err(|e| format!("Invalid auth URL: {}", e))?;

    let token_url = TokenUrl::new(build_authority_url(
        &config.authority_host,
        &config.tenant_id,
        "token",
    ))
    .map_err(|e| format!("Invalid token URL: {}", e))?;

    let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
        .map_err(|e| format!("Invalid redirect URL: {}", e))?;

    let client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_type(AuthType::RequestBody)
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url);

    Ok(client)
}

// =============================================================================
// Tests
// =============================================================================
