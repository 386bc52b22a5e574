//! Embed-token negotiation
//!
//! Not every dataset enforces row-level security, and the platform rejects an
//! identity claim for datasets that don't while requiring one for datasets that do.
//! Rather than keep per-dataset metadata, each request tries in order:
//!
//! 1. Ask for a token without identity. Success → `Unfiltered`.
//! 2. If the platform answers with the "requires effective identity" signature,
//!    resolve the user's roles and ask again with an identity claim. Success → `Filtered`.
//! 3. Any other failure, on either attempt, is returned to the caller.
//!
//! A cache keyed by dataset ID could skip the first attempt for restricted datasets
//! if call volume ever justified it.

use std::collections::BTreeSet;

use thiserror::Error;

use super::{EffectiveIdentity, EmbedToken, EmbedTokenRequest, ReportingApi, ReportingError};
use crate::access::resolve_roles;
use crate::store::{ConfigStore, StoreError};

/// Whether row-level filtering applies to an embed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// Token carries the user's identity and roles
    Filtered,
    /// Dataset has no row-level security; token carries no identity
    Unfiltered,
}

impl EmbedMode {
    pub fn is_filtered(&self) -> bool {
        matches!(self, EmbedMode::Filtered)
    }
}

#[derive(Debug, Clone)]
pub struct EmbedSession {
    pub token: EmbedToken,
    pub mode: EmbedMode,
    /// Roles sent with the identity claim (empty when unfiltered)
    pub roles: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error(transparent)]
    Reporting(#[from] ReportingError),

    #[error("Failed to resolve dataset roles: {0}")]
    Roles(#[from] StoreError),
}

/// Obtain an embed token for `report_id`, adding the user's identity only when
/// the dataset demands it
pub async fn negotiate_embed_token(
    api: &dyn ReportingApi,
    store: &dyn ConfigStore,
    report_id: &str,
    dataset_id: &str,
    user_email: &str,
) -> Result<EmbedSession, EmbedError> {
    let request = EmbedTokenRequest::for_report(report_id, dataset_id);

    let first_error = match api.generate_embed_token(&request).await {
        Ok(token) => {
            tracing::info!(
                report_id = %report_id,
                dataset_id = %dataset_id,
                mode = "unfiltered",
                "Embed token issued"
            );
            return Ok(EmbedSession {
                token,
                mode: EmbedMode::Unfiltered,
                roles: BTreeSet::new(),
            });
        }
        Err(e) => e,
    };

    if !first_error.requires_identity() {
        tracing::error!(
            report_id = %report_id,
            dataset_id = %dataset_id,
            error = %first_error,
            "Embed token request failed"
        );
        return Err(first_error.into());
    }

    let roles = resolve_roles(store, user_email, dataset_id).await?;

    tracing::debug!(
        report_id = %report_id,
        dataset_id = %dataset_id,
        email = %user_email,
        roles = ?roles,
        "Dataset requires identity - retrying with roles"
    );

    let request = request.with_identity(EffectiveIdentity {
        username: user_email.to_string(),
        roles: roles.iter().cloned().collect(),
        datasets: vec![dataset_id.to_string()],
    });

    let token = api.generate_embed_token(&request).await.map_err(|e| {
        tracing::error!(
            report_id = %report_id,
            dataset_id = %dataset_id,
            email = %user_email,
            error = %e,
            "Embed token request with identity failed"
        );
        EmbedError::from(e)
    })?;

    tracing::info!(
        report_id = %report_id,
        dataset_id = %dataset_id,
        email = %user_email,
        mode = "filtered",
        "Embed token issued"
    );

    Ok(EmbedSession {
        token,
        mode: EmbedMode::Filtered,
        roles,
    })
}
