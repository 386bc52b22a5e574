//! Signed session cookies
//!
//! The session holds only the user's display name and email. Everything else
//! (roles, report access, admin status) is resolved per request from the store.

use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "session";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const LOGIN_ERROR_COOKIE: &str = "login_error";

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: String,
    pub email: String,
}

impl SessionUser {
    /// Read the session from a verified jar; tampered or malformed cookies read as absent
    pub fn from_jar(jar: &SignedCookieJar) -> Option<Self> {
        let cookie = jar.get(SESSION_COOKIE)?;
        match serde_json::from_str::<SessionUser>(cookie.value()) {
            Ok(user) if !user.email.trim().is_empty() => Some(user),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed session cookie");
                None
            }
        }
    }

    /// Name to greet the user with
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

/// Build an HttpOnly, SameSite=Lax cookie (Secure in production)
pub fn build_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Cookie matching `build_cookie`'s path, for removal
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

pub fn start_session(
    jar: SignedCookieJar,
    user: &SessionUser,
    secure: bool,
) -> Result<SignedCookieJar, serde_json::Error> {
    let value = serde_json::to_string(user)?;
    Ok(jar.add(build_cookie(SESSION_COOKIE, value, secure)))
}

pub fn end_session(jar: SignedCookieJar) -> SignedCookieJar {
    jar.remove(removal_cookie(SESSION_COOKIE))
}

/// Store a message for the next render of the login page
pub fn flash_login_error(
    jar: SignedCookieJar,
    message: impl Into<String>,
    secure: bool,
) -> SignedCookieJar {
    jar.add(build_cookie(LOGIN_ERROR_COOKIE, message.into(), secure))
}

/// Read and clear the flashed login error
pub fn take_login_error(jar: SignedCookieJar) -> (SignedCookieJar, Option<String>) {
    match jar.get(LOGIN_ERROR_COOKIE) {
        Some(cookie) => {
            let message = cookie.value().to_string();
            (jar.remove(removal_cookie(LOGIN_ERROR_COOKIE)), Some(message))
        }
        None => (jar, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Key;

    fn user() -> SessionUser {
        SessionUser {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn test_session_roundtrip_through_signed_jar() {
        let jar = SignedCookieJar::new(Key::generate());
        let jar = start_session(jar, &user(), false).unwrap();

        assert_eq!(SessionUser::from_jar(&jar), Some(user()));

        let jar = end_session(jar);
        assert_eq!(SessionUser::from_jar(&jar), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = build_cookie(SESSION_COOKIE, "v".to_string(), true);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_login_error_is_taken_once() {
        let jar = SignedCookieJar::new(Key::generate());
        let jar = flash_login_error(jar, "Authentication failed", false);

        let (jar, message) = take_login_error(jar);
        assert_eq!(message.as_deref(), Some("Authentication failed"));

        let (_, message) = take_login_error(jar);
        assert_eq!(message, None);
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut user = user();
        assert_eq!(user.display_name(), "Alice");
        user.name = " ".to_string();
        assert_eq!(user.display_name(), "alice@example.com");
    }
}
