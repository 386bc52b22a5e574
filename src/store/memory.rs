//! In-memory store for tests

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{edit, ActivityRecord, AdminUser, ConfigStore, ReportAccess, RoleMapping, StoreError};

#[derive(Default)]
struct Inner {
    role_mappings: Vec<RoleMapping>,
    report_access: Vec<ReportAccess>,
    admin_users: Vec<AdminUser>,
    activity: Vec<ActivityRecord>,
}

/// Keeps everything in memory; `failing()` builds one that rejects every call
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail: bool,
    /// Remaining `load_*` calls to reject
    load_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Reject the next `count` list loads, then behave normally
    pub fn failing_loads(self, count: usize) -> Self {
        self.load_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Number of trait calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(StoreError::InvalidData("memory store configured to fail".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_load(&self) -> Result<(), StoreError> {
        self.check()?;
        let pending = self
            .load_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match pending {
            Ok(_) => Err(StoreError::InvalidData("memory store load interrupted".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn load_role_mappings(&self) -> Result<Vec<RoleMapping>, StoreError> {
        self.check_load()?;
        Ok(self.inner.lock().await.role_mappings.clone())
    }

    async fn save_role_mappings(&self, mappings: &[RoleMapping]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().await.role_mappings = mappings.to_vec();
        Ok(())
    }

    async fn put_role_mapping(&self, mapping: &RoleMapping) -> Result<(), StoreError> {
        self.check()?;
        edit::put_role_mapping(&mut self.inner.lock().await.role_mappings, mapping);
        Ok(())
    }

    async fn remove_role_mappings(
        &self,
        user_email: &str,
        dataset_id: Option<&str>,
    ) -> Result<usize, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        Ok(edit::remove_role_mappings(&mut inner.role_mappings, user_email, dataset_id))
    }

    async fn load_report_access(&self) -> Result<Vec<ReportAccess>, StoreError> {
        self.check_load()?;
        Ok(self.inner.lock().await.report_access.clone())
    }

    async fn save_report_access(&self, entries: &[ReportAccess]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().await.report_access = entries.to_vec();
        Ok(())
    }

    async fn put_report_access(&self, entry: &ReportAccess) -> Result<(), StoreError> {
        self.check()?;
        edit::put_report_access(&mut self.inner.lock().await.report_access, entry);
        Ok(())
    }

    async fn remove_report_access(&self, user_email: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        Ok(edit::remove_report_access(&mut inner.report_access, user_email))
    }

    async fn load_admin_users(&self) -> Result<Vec<AdminUser>, StoreError> {
        self.check_load()?;
        Ok(self.inner.lock().await.admin_users.clone())
    }

    async fn save_admin_users(&self, admins: &[AdminUser]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().await.admin_users = admins.to_vec();
        Ok(())
    }

    async fn put_admin_user(&self, admin: &AdminUser) -> Result<AdminUser, StoreError> {
        self.check()?;
        Ok(edit::put_admin_user(&mut self.inner.lock().await.admin_users, admin))
    }

    async fn remove_admin_user(&self, email: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        Ok(edit::remove_admin_user(&mut inner.admin_users, email))
    }

    async fn record_activity(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().await.activity.push(record.clone());
        Ok(())
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        self.check()?;
        let mut records = self.inner.lock().await.activity.clone();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}
