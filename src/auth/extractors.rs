use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::SignedCookieJar;

use super::session::SessionUser;
use crate::{access::is_admin, web::error::AppError, AppState};

/// Signed-in user extractor - reads the signed session cookie
///
/// Rejects with `AppError::Unauthenticated` (redirect to `/login`) when the
/// cookie is missing, tampered with, or malformed.
///
/// Usage:
/// ```rust,ignore
/// async fn handler(CurrentUser(user): CurrentUser) {
///     println!("User: {}", user.email);
/// }
/// ```
pub struct CurrentUser(pub SessionUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_headers(&parts.headers, state.cookie_key.clone());

        let user = SessionUser::from_jar(&jar).ok_or(AppError::Unauthenticated)?;

        tracing::debug!(email = %user.email, "User authenticated via session cookie");
        Ok(CurrentUser(user))
    }
}

/// Admin extractor - a signed-in user who is in the admin store or allow-list
pub struct RequireAdmin(pub SessionUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if !is_admin(state.store.as_ref(), &state.config.admin_emails, &user.email).await {
            return Err(AppError::Forbidden {
                email: user.email,
                admins: state.config.admin_emails.clone(),
            });
        }

        Ok(RequireAdmin(user))
    }
}

/// Request metadata recorded with activity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        // First hop of X-Forwarded-For is the original client
        let ip_address = header("x-forwarded-for")
            .and_then(|list| list.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .or_else(|| header("x-real-ip").map(str::to_string));

        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        ClientMeta {
            ip_address,
            user_agent,
        }
    }
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientMeta::from_headers(&parts.headers))
    }
}
