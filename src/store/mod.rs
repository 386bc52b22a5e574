//! Configuration store
//!
//! Persists the three mapping kinds (role mappings, report access, admin users)
//! and the append-only activity log.
//!
//! ## Backends
//!
//! - `sql`: one PostgreSQL table per kind, upsert-by-key
//! - `file`: one JSON file per kind, overwritten wholesale on save
//! - `fallback`: wraps a primary backend and retries failed operations on a secondary
//!
//! The backend is chosen once at startup (see `open_store`).
//!
//! Admin edits go through the per-key operations (`put_*` / `remove_*`), which
//! touch exactly one record. The full-list `save_*` calls never remove records
//! from the SQL backend, so a list read from a stale fallback cannot delete rows.

mod edit;
pub mod fallback;
pub mod file;
pub mod import;
pub mod models;
pub mod sql;

#[cfg(test)]
pub(crate) mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::config::{Config, DatabaseConfig};

pub use fallback::FallbackStore;
pub use file::FileStore;
pub use import::{import_missing, ImportSummary};
pub use models::{
    email_key, ActivityRecord, ActivityType, AdminUser, ReportAccess, RoleMapping,
};
pub use sql::SqlStore;

/// Errors raised by store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database error: {operation} failed: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }
}

/// Uniform interface over the storage backends
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Short backend name for logs and the admin page
    fn backend_name(&self) -> &'static str;

    /// Cheap liveness check used by the readiness endpoint
    async fn ping(&self) -> Result<(), StoreError>;

    async fn load_role_mappings(&self) -> Result<Vec<RoleMapping>, StoreError>;
    /// Write every mapping in the list; the SQL backend keeps rows missing from it
    async fn save_role_mappings(&self, mappings: &[RoleMapping]) -> Result<(), StoreError>;
    /// Insert or replace the mapping keyed by (email, dataset)
    async fn put_role_mapping(&self, mapping: &RoleMapping) -> Result<(), StoreError>;
    /// Remove the user's mapping for one dataset, or for every dataset when `None`.
    /// Returns the number of mappings removed.
    async fn remove_role_mappings(
        &self,
        user_email: &str,
        dataset_id: Option<&str>,
    ) -> Result<usize, StoreError>;

    async fn load_report_access(&self) -> Result<Vec<ReportAccess>, StoreError>;
    async fn save_report_access(&self, entries: &[ReportAccess]) -> Result<(), StoreError>;
    async fn put_report_access(&self, entry: &ReportAccess) -> Result<(), StoreError>;
    async fn remove_report_access(&self, user_email: &str) -> Result<bool, StoreError>;

    async fn load_admin_users(&self) -> Result<Vec<AdminUser>, StoreError>;
    async fn save_admin_users(&self, admins: &[AdminUser]) -> Result<(), StoreError>;
    /// Add the admin or update name and flag of an existing one; returns the stored record
    async fn put_admin_user(&self, admin: &AdminUser) -> Result<AdminUser, StoreError>;
    async fn remove_admin_user(&self, email: &str) -> Result<bool, StoreError>;

    async fn record_activity(&self, record: &ActivityRecord) -> Result<(), StoreError>;

    /// Most recent activity first
    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError>;
}

/// Open the configured store
///
/// With database settings the SQL backend is wrapped in a fallback to the file
/// backend. A database that cannot be reached at startup is logged and the file
/// backend is used on its own.
pub async fn open_store(config: &Config) -> Arc<dyn ConfigStore> {
    let file_store: Arc<dyn ConfigStore> = Arc::new(FileStore::new(&config.data_dir));

    let Some(database) = &config.database else {
        tracing::warn!(
            data_dir = %config.data_dir.display(),
            "Database not configured - using JSON files"
        );
        return file_store;
    };

    match connect_sql(database).await {
        Ok(sql_store) => {
            tracing::info!(
                max_connections = database.max_connections,
                "Database connected (SQL mode with file fallback)"
            );
            Arc::new(FallbackStore::new(Arc::new(sql_store), file_store))
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                data_dir = %config.data_dir.display(),
                "Database unavailable at startup - using JSON files"
            );
            file_store
        }
    }
}

async fn connect_sql(database: &DatabaseConfig) -> Result<SqlStore, StoreError> {
    let store = SqlStore::connect(database).await?;
    store.migrate().await?;
    Ok(store)
}

// =============================================================================
// Admin edit helpers
// =============================================================================

/// Insert or replace the mapping for (email, dataset)
pub async fn upsert_role_mapping(
    store: &dyn ConfigStore,
    user_email: &str,
    dataset_id: &str,
    roles: impl IntoIterator<Item = String>,
    created_by: &str,
) -> Result<RoleMapping, StoreError> {
    let mapping = RoleMapping {
        user_email: user_email.trim().to_string(),
        dataset_id: dataset_id.to_string(),
        roles: roles.into_iter().collect(),
        created_at: Some(Utc::now()),
        created_by: created_by.to_string(),
    };

    store.put_role_mapping(&mapping).await?;
    Ok(mapping)
}

/// Remove the user's mapping for one dataset, or every mapping when no dataset is given.
/// Returns the number of mappings removed.
pub async fn delete_role_mappings(
    store: &dyn ConfigStore,
    user_email: &str,
    dataset_id: Option<&str>,
) -> Result<usize, StoreError> {
    store.remove_role_mappings(user_email.trim(), dataset_id).await
}

/// Replace the user's report access set
pub async fn upsert_report_access(
    store: &dyn ConfigStore,
    user_email: &str,
    report_ids: impl IntoIterator<Item = String>,
    created_by: &str,
) -> Result<ReportAccess, StoreError> {
    let entry = ReportAccess {
        user_email: user_email.trim().to_string(),
        report_ids: report_ids.into_iter().collect(),
        created_at: Some(Utc::now()),
        created_by: created_by.to_string(),
    };

    store.put_report_access(&entry).await?;
    Ok(entry)
}

/// Returns whether a record was removed
pub async fn delete_report_access(
    store: &dyn ConfigStore,
    user_email: &str,
) -> Result<bool, StoreError> {
    store.remove_report_access(user_email.trim()).await
}

/// Add an admin, or update the name and flag of an existing one
pub async fn upsert_admin_user(
    store: &dyn ConfigStore,
    email: &str,
    name: &str,
    is_super_admin: bool,
    created_by: &str,
) -> Result<AdminUser, StoreError> {
    let admin = AdminUser {
        email: email.trim().to_string(),
        name: name.to_string(),
        created_by: created_by.to_string(),
        is_super_admin,
        created_at: Some(Utc::now()),
    };

    store.put_admin_user(&admin).await
}

/// Returns whether a record was removed
pub async fn delete_admin_user(store: &dyn ConfigStore, email: &str) -> Result<bool, StoreError> {
    store.remove_admin_user(email.trim()).await
}
