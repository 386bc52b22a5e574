//! Authentication handlers for login, callback, and logout flows
//!
//! - `login_page_handler`: Sign-in page, shows a flashed error once
//! - `login_handler`: Initiates the OAuth2 authorization code flow
//! - `callback_handler`: Validates state, exchanges the code, loads the profile, starts the session
//! - `logout_handler`: Clears the session

use askama::Template;
use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use oauth2::{AuthorizationCode, CsrfToken, Scope, TokenResponse};
use serde::Deserialize;

use super::extractors::ClientMeta;
use super::helpers::{create_oauth_client, SIGN_IN_SCOPES};
use super::identity::fetch_profile;
use super::session::{
    build_cookie, end_session, flash_login_error, removal_cookie, start_session, take_login_error,
    SessionUser, OAUTH_STATE_COOKIE,
};
use crate::{activity::record_login, web::error::AppError, web::templates::LoginTemplate, AppState};

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Login page - redirects home when a session already exists
pub async fn login_page_handler(jar: SignedCookieJar) -> Result<Response, AppError> {
    if SessionUser::from_jar(&jar).is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let (jar, error) = take_login_error(jar);
    let html = LoginTemplate { error }.render()?;

    Ok((jar, Html(html)).into_response())
}

/// Login handler - initiates OAuth2 authorization code flow
pub async fn login_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<Response, AppError> {
    tracing::info!("Login requested");

    let oauth_client = create_oauth_client(&state.config).map_err(|e| {
        tracing::error!(error = %e, "Failed to create OAuth client");
        AppError::Internal(format!("OAuth configuration error: {}", e))
    })?;

    // Generate authorization URL with CSRF protection
    let (auth_url, csrf_token) = oauth_client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(SIGN_IN_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .url();

    tracing::info!(
        authority = %state.config.authority_host,
        tenant_id = %state.config.tenant_id,
        "Redirecting to identity provider for authentication"
    );

    // CSRF state lives in a signed cookie until the callback
    let jar = jar.add(build_cookie(
        OAUTH_STATE_COOKIE,
        csrf_token.secret().clone(),
        state.config.is_production(),
    ));

    Ok((jar, Redirect::to(auth_url.as_str())).into_response())
}

/// Send the browser back to the login page with a message
fn login_failed(jar: SignedCookieJar, message: &str, secure: bool) -> Response {
    let jar = jar.remove(removal_cookie(OAUTH_STATE_COOKIE));
    let jar = flash_login_error(jar, message, secure);
    (jar, Redirect::to("/login")).into_response()
}

/// Callback handler - handles OAuth2 callback, token exchange and profile lookup
pub async fn callback_handler(
    Query(params): Query<CallbackParams>,
    State(state): State<AppState>,
    jar: SignedCookieJar,
    meta: ClientMeta,
) -> Response {
    tracing::info!("OAuth callback received");
    let secure = state.config.is_production();

    // Check for OAuth errors
    if let Some(error) = params.error {
        tracing::warn!(
            error = %error,
            description = ?params.error_description,
            "OAuth authorization failed"
        );
        let message = params
            .error_description
            .unwrap_or_else(|| "Authentication failed. Please try again.".to_string());
        return login_failed(jar, &message, secure);
    }

    // CSRF Protection: Validate state parameter matches stored cookie
    let stored_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    match (params.state.as_deref(), stored_state.as_deref()) {
        (Some(received), Some(stored)) if received == stored => {
            tracing::debug!("CSRF validation successful");
        }
        (received, stored) => {
            tracing::warn!(
                has_state_param = received.is_some(),
                has_state_cookie = stored.is_some(),
                "CSRF validation failed"
            );
            return login_failed(jar, "Sign-in session expired. Please try again.", secure);
        }
    }

    let Some(code) = params.code else {
        tracing::warn!("No authorization code received");
        return login_failed(jar, "No authorization code received from the identity provider.", secure);
    };

    let oauth_client = match create_oauth_client(&state.config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create OAuth client");
            return AppError::Internal(format!("OAuth configuration error: {}", e)).into_response();
        }
    };

    tracing::info!("Exchanging authorization code for tokens");

    let token_response = match oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .request_async(&state.http_client)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "Failed to exchange code for tokens");
            return login_failed(jar, "Sign-in failed while exchanging the authorization code.", secure);
        }
    };

    let user = match fetch_profile(
        &state.http_client,
        &state.config.graph_api_url,
        token_response.access_token().secret(),
    )
    .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch user profile");
            return login_failed(jar, "Failed to get user info from the identity provider.", secure);
        }
    };

    let jar = jar.remove(removal_cookie(OAUTH_STATE_COOKIE));
    let jar = match start_session(jar, &user, secure) {
        Ok(jar) => jar,
        Err(e) => {
            return AppError::Internal(format!("Failed to encode session: {}", e)).into_response();
        }
    };

    record_login(state.store.as_ref(), &user, &meta).await;

    tracing::info!(email = %user.email, "Authentication successful");
    (jar, Redirect::to("/")).into_response()
}

/// Logout handler - clears the portal session
pub async fn logout_handler(jar: SignedCookieJar) -> impl IntoResponse {
    if let Some(user) = SessionUser::from_jar(&jar) {
        tracing::info!(email = %user.email, "User logged out");
    }
    (end_session(jar), Redirect::to("/login"))
}
