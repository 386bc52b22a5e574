//! Report portal library
//!
//! Provides the core functionality for the embedded-report portal: sign-in,
//! per-user report access and row-level-security roles, embed-token
//! negotiation, and the admin panel.

#![deny(dead_code)]

pub mod access;
pub mod activity;
pub mod auth;
pub mod config;
pub mod reporting;
pub mod store;
pub mod web;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use config::Config;
use reporting::ReportingApi;
use std::sync::Arc;
use store::ConfigStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConfigStore>,
    pub reporting: Arc<dyn ReportingApi>,
    /// Client for sign-in token exchange and profile lookup
    pub http_client: reqwest::Client,
    /// Signs the session, CSRF-state and flash cookies
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
