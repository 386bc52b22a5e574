//! One-way import between stores
//!
//! Copies records whose key is absent from the target. Existing target records
//! are never modified, so the import can be re-run safely.

use std::collections::HashSet;
use std::hash::Hash;

use super::{email_key, ConfigStore, StoreError};

/// Records added per collection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub role_mappings: usize,
    pub report_access: usize,
    pub admin_users: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.role_mappings + self.report_access + self.admin_users
    }
}

/// Incoming records whose key is not yet present, first occurrence wins
fn missing<T, K, F>(existing: &[T], incoming: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = existing.iter().map(&key).collect();
    incoming
        .into_iter()
        .filter(|record| seen.insert(key(record)))
        .collect()
}

pub async fn import_missing(
    source: &dyn ConfigStore,
    target: &dyn ConfigStore,
) -> Result<ImportSummary, StoreError> {
    let mut summary = ImportSummary::default();

    let mappings = missing(
        &target.load_role_mappings().await?,
        source.load_role_mappings().await?,
        |m| (email_key(&m.user_email), m.dataset_id.clone()),
    );
    for mapping in &mappings {
        target.put_role_mapping(mapping).await?;
    }
    summary.role_mappings = mappings.len();

    let entries = missing(
        &target.load_report_access().await?,
        source.load_report_access().await?,
        |e| email_key(&e.user_email),
    );
    for entry in &entries {
        target.put_report_access(entry).await?;
    }
    summary.report_access = entries.len();

    let admins = missing(
        &target.load_admin_users().await?,
        source.load_admin_users().await?,
        |a| email_key(&a.email),
    );
    for admin in &admins {
        target.put_admin_user(admin).await?;
    }
    summary.admin_users = admins.len();

    tracing::info!(
        source = source.backend_name(),
        target = target.backend_name(),
        role_mappings = summary.role_mappings,
        report_access = summary.report_access,
        admin_users = summary.admin_users,
        "Import complete"
    );

    Ok(summary)
}
