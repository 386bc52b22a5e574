//! Reporting platform (Power BI) integration
//!
//! ## Structure
//!
//! - `client`: REST client authenticated as the application's service principal
//! - `embed`: embed-token negotiation (first without identity, retry with roles)
//!
//! Handlers depend on the `ReportingApi` trait so the negotiation and routes can
//! run against a stub in tests.

pub mod client;
pub mod embed;

#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::PowerBiClient;
pub use embed::{negotiate_embed_token, EmbedError, EmbedMode, EmbedSession};

/// Substring the platform uses when a dataset enforces row-level security and
/// the token request carried no identity
const REQUIRES_IDENTITY_SIGNATURE: &str = "requires effective identity";

/// A report in the configured workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub name: String,
    pub dataset_id: String,
    pub embed_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

/// Identity claim attached to an embed token request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveIdentity {
    pub username: String,
    pub roles: Vec<String>,
    pub datasets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

/// Body of a `GenerateToken` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedTokenRequest {
    pub datasets: Vec<IdRef>,
    pub reports: Vec<IdRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<EffectiveIdentity>,
}

impl EmbedTokenRequest {
    /// Request scoped to one report and its dataset, without identity
    pub fn for_report(report_id: &str, dataset_id: &str) -> Self {
        Self {
            datasets: vec![IdRef {
                id: dataset_id.to_string(),
            }],
            reports: vec![IdRef {
                id: report_id.to_string(),
            }],
            identities: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: EffectiveIdentity) -> Self {
        self.identities.push(identity);
        self
    }
}

/// Short-lived credential the browser uses to render a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedToken {
    pub token: String,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
}

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("Failed to acquire reporting API token: {0}")]
    Auth(String),

    #[error("Reporting API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Reporting API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid reporting API URL: {0}")]
    InvalidUrl(String),
}

impl ReportingError {
    /// Whether the platform refused a token request because the dataset needs an identity claim
    pub fn requires_identity(&self) -> bool {
        match self {
            ReportingError::Upstream { status, body } => {
                *status == 400 && body.to_lowercase().contains(REQUIRES_IDENTITY_SIGNATURE)
            }
            _ => false,
        }
    }

    /// Upstream HTTP status, when the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ReportingError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Operations the portal needs from the reporting platform
#[async_trait]
pub trait ReportingApi: Send + Sync {
    /// Every report in the configured workspace
    async fn list_reports(&self) -> Result<Vec<Report>, ReportingError>;

    async fn get_report(&self, report_id: &str) -> Result<Report, ReportingError>;

    /// Names of the row-level-security roles defined on a dataset
    async fn list_dataset_roles(&self, dataset_id: &str) -> Result<Vec<String>, ReportingError>;

    async fn generate_embed_token(
        &self,
        request: &EmbedTokenRequest,
    ) -> Result<EmbedToken, ReportingError>;
}
