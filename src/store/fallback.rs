use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ActivityRecord, AdminUser, ConfigStore, ReportAccess, RoleMapping, StoreError};

/// Runs every operation against `primary` and, when it fails, repeats the same
/// operation against `secondary`.
///
/// Best-effort availability only: nothing written to the secondary is copied back
/// to the primary once it recovers. Each call falls back on its own, so edits use
/// the per-key operations rather than a load followed by a save.
pub struct FallbackStore {
    primary: Arc<dyn ConfigStore>,
    secondary: Arc<dyn ConfigStore>,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn ConfigStore>, secondary: Arc<dyn ConfigStore>) -> Self {
        Self { primary, secondary }
    }

    async fn with_fallback<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, StoreError>
    where
        F: Fn(Arc<dyn ConfigStore>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match op(self.primary.clone()).await {
            Ok(value) => Ok(value),
            Err(error) => {
                tracing::warn!(
                    operation,
                    primary = self.primary.backend_name(),
                    secondary = self.secondary.backend_name(),
                    error = %error,
                    "Primary store failed - falling back"
                );
                op(self.secondary.clone()).await
            }
        }
    }
}

#[async_trait]
impl ConfigStore for FallbackStore {
    fn backend_name(&self) -> &'static str {
        self.primary.backend_name()
    }

    /// Ready when either backend answers
    async fn ping(&self) -> Result<(), StoreError> {
        self.with_fallback("ping", |store| async move { store.ping().await })
            .await
    }

    async fn load_role_mappings(&self) -> Result<Vec<RoleMapping>, StoreError> {
        self.with_fallback("load_role_mappings", |store| async move {
            store.load_role_mappings().await
        })
        .await
    }

    async fn save_role_mappings(&self, mappings: &[RoleMapping]) -> Result<(), StoreError> {
        let mappings = mappings.to_vec();
        self.with_fallback("save_role_mappings", move |store| {
            let mappings = mappings.clone();
            async move { store.save_role_mappings(&mappings).await }
        })
        .await
    }

    async fn put_role_mapping(&self, mapping: &RoleMapping) -> Result<(), StoreError> {
        let mapping = mapping.clone();
        self.with_fallback("put_role_mapping", move |store| {
            let mapping = mapping.clone();
            async move { store.put_role_mapping(&mapping).await }
        })
        .await
    }

    async fn remove_role_mappings(
        &self,
        user_email: &str,
        dataset_id: Option<&str>,
    ) -> Result<usize, StoreError> {
        let user_email = user_email.to_string();
        let dataset_id = dataset_id.map(str::to_string);
        self.with_fallback("remove_role_mappings", move |store| {
            let user_email = user_email.clone();
            let dataset_id = dataset_id.clone();
            async move {
                store
                    .remove_role_mappings(&user_email, dataset_id.as_deref())
                    .await
            }
        })
        .await
    }

    async fn load_report_access(&self) -> Result<Vec<ReportAccess>, StoreError> {
        self.with_fallback("load_report_access", |store| async move {
            store.load_report_access().await
        })
        .await
    }

    async fn save_report_access(&self, entries: &[ReportAccess]) -> Result<(), StoreError> {
        let entries = entries.to_vec();
        self.with_fallback("save_report_access", move |store| {
            let entries = entries.clone();
            async move { store.save_report_access(&entries).await }
        })
        .await
    }

    async fn put_report_access(&self, entry: &ReportAccess) -> Result<(), StoreError> {
        let entry = entry.clone();
        self.with_fallback("put_report_access", move |store| {
            let entry = entry.clone();
            async move { store.put_report_access(&entry).await }
        })
        .await
    }

    async fn remove_report_access(&self, user_email: &str) -> Result<bool, StoreError> {
        let user_email = user_email.to_string();
        self.with_fallback("remove_report_access", move |store| {
            let user_email = user_email.clone();
            async move { store.remove_report_access(&user_email).await }
        })
        .await
    }

    async fn load_admin_users(&self) -> Result<Vec<AdminUser>, StoreError> {
        self.with_fallback("load_admin_users", |store| async move {
            store.load_admin_users().await
        })
        .await
    }

    async fn save_admin_users(&self, admins: &[AdminUser]) -> Result<(), StoreError> {
        let admins = admins.to_vec();
        self.with_fallback("save_admin_users", move |store| {
            let admins = admins.clone();
            async move { store.save_admin_users(&admins).await }
        })
        .await
    }

    async fn put_admin_user(&self, admin: &AdminUser) -> Result<AdminUser, StoreError> {
        let admin = admin.clone();
        self.with_fallback("put_admin_user", move |store| {
            let admin = admin.clone();
            async move { store.put_admin_user(&admin).await }
        })
        .await
    }

    async fn remove_admin_user(&self, email: &str) -> Result<bool, StoreError> {
        let email = email.to_string();
        self.with_fallback("remove_admin_user", move |store| {
            let email = email.clone();
            async move { store.remove_admin_user(&email).await }
        })
        .await
    }

    async fn record_activity(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_fallback("record_activity", move |store| {
            let record = record.clone();
            async move { store.record_activity(&record).await }
        })
        .await
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        self.with_fallback("recent_activity", move |store| async move {
            store.recent_activity(limit).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{delete_role_mappings, upsert_role_mapping};

    fn mapping(email: &str) -> RoleMapping {
        RoleMapping {
            user_email: email.to_string(),
            dataset_id: "ds-1".to_string(),
            roles: ["Sales".to_string()].into_iter().collect(),
            created_at: None,
            created_by: "admin".to_string(),
        }
    }

    #[tokio::test]
    async fn test_healthy_primary_never_touches_secondary() {
        let primary = Arc::new(MemoryStore::default());
        let secondary = Arc::new(MemoryStore::default());
        let store = FallbackStore::new(primary.clone(), secondary.clone());

        store.save_role_mappings(&[mapping("a@example.com")]).await.unwrap();
        let loaded = store.load_role_mappings().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(primary.load_role_mappings().await.unwrap().len(), 1);
        assert!(secondary.load_role_mappings().await.unwrap().is_empty());
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_primary_reads_from_secondary() {
        let primary = Arc::new(MemoryStore::failing());
        let secondary = Arc::new(MemoryStore::default());
        secondary
            .save_report_access(&[ReportAccess {
                user_email: "b@example.com".to_string(),
                report_ids: ["r1".to_string()].into_iter().collect(),
                created_at: None,
                created_by: "admin".to_string(),
            }])
            .await
            .unwrap();

        let store = FallbackStore::new(primary.clone(), secondary);
        let loaded = store.load_report_access().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].user_email, "b@example.com");
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_primary_writes_to_secondary() {
        let primary = Arc::new(MemoryStore::failing());
        let secondary = Arc::new(MemoryStore::default());
        let store = FallbackStore::new(primary, secondary.clone());

        upsert_role_mapping(
            &store,
            "c@example.com",
            "ds-1",
            vec!["Finance".to_string()],
            "admin",
        )
        .await
        .unwrap();

        let saved = secondary.load_role_mappings().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].user_email, "c@example.com");
    }

    #[tokio::test]
    async fn test_interrupted_load_does_not_drop_primary_rows() {
        let primary = Arc::new(MemoryStore::default().failing_loads(1));
        primary
            .save_role_mappings(&[
                mapping("a@example.com"),
                mapping("b@example.com"),
                mapping("c@example.com"),
            ])
            .await
            .unwrap();
        let secondary = Arc::new(MemoryStore::default());
        let store = FallbackStore::new(primary.clone(), secondary.clone());

        // The admin page read lands on the (empty) secondary
        assert!(store.load_role_mappings().await.unwrap().is_empty());

        upsert_role_mapping(&store, "new@example.com", "ds-1", vec!["Sales".to_string()], "admin")
            .await
            .unwrap();
        let removed = delete_role_mappings(&store, "b@example.com", Some("ds-1"))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let emails: Vec<String> = primary
            .load_role_mappings()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.user_email)
            .collect();
        assert_eq!(emails, vec!["a@example.com", "c@example.com", "new@example.com"]);
        assert_eq!(secondary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_secondary_error() {
        let store = FallbackStore::new(
            Arc::new(MemoryStore::failing()),
            Arc::new(MemoryStore::failing()),
        );

        assert!(store.load_admin_users().await.is_err());
        assert!(store.ping().await.is_err());
    }
}
