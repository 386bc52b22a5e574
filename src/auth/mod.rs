//! Authentication module
//!
//! Sign-in against the organization's identity provider and the signed
//! session cookie that follows it.
//!
//! ## Structure
//!
//! - `extractors`: Axum extractors for signed-in users, admins and client metadata
//! - `session`: Signed session, CSRF-state and flash cookies
//! - `identity`: Profile lookup with the user's delegated token
//! - `helpers`: Pure helper functions (URL builders, HTTP and OAuth2 clients)
//! - `handlers`: HTTP handlers for login, callback, and logout flows
//!
//! ## Authentication Flow
//!
//! 1. User visits `/auth/login` → redirect to the identity provider
//! 2. Provider authenticates → redirect to `/auth/callback`
//! 3. Portal exchanges the code, loads the profile → sets the session cookie → redirect to `/`
//! 4. User visits `/logout` → session cookie removed → redirect to `/login`

pub mod extractors;
pub mod handlers;
pub mod helpers;
pub mod identity;
pub mod session;

// Re-export handlers for convenient routing
pub use handlers::{callback_handler, login_handler, login_page_handler, logout_handler};
