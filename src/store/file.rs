use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{edit, ActivityRecord, AdminUser, ConfigStore, ReportAccess, RoleMapping, StoreError};

pub const ROLE_MAPPINGS_FILE: &str = "rls-config.json";
pub const REPORT_ACCESS_FILE: &str = "reports-access.json";
pub const ADMIN_USERS_FILE: &str = "admin-users.json";
pub const ACTIVITY_LOG_FILE: &str = "activity-log.jsonl";

/// Flat-file backend: one pretty-printed JSON array per kind, activity as JSON lines
pub struct FileStore {
    dir: PathBuf,
    /// Serializes writers so concurrent saves cannot interleave temp files
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn load_list<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, StoreError> {
        let path = self.path(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&path, source)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    async fn save_list<T: Serialize>(&self, file: &str, items: &[T]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_list(file, items).await
    }

    /// Load, edit and rewrite one file while holding the write lock
    async fn modify_list<T, R, F>(&self, file: &str, modify: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
        F: FnOnce(&mut Vec<T>) -> R + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut items = self.load_list(file).await?;
        let result = modify(&mut items);
        self.write_list(file, &items).await?;
        Ok(result)
    }

    /// Callers hold `write_lock`
    async fn write_list<T: Serialize>(&self, file: &str, items: &[T]) -> Result<(), StoreError> {
        let path = self.path(file);
        let json = serde_json::to_vec_pretty(items).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;

        // Write beside the target then rename so readers never see a partial file
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|source| io_error(&tmp_path, source))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| io_error(&path, source))?;

        tracing::debug!(path = %path.display(), entries = items.len(), "Saved config file");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::InvalidData(format!(
                "{} is not a directory",
                self.dir.display()
            ))),
            Err(source) => Err(io_error(&self.dir, source)),
        }
    }

    async fn load_role_mappings(&self) -> Result<Vec<RoleMapping>, StoreError> {
        self.load_list(ROLE_MAPPINGS_FILE).await
    }

    async fn save_role_mappings(&self, mappings: &[RoleMapping]) -> Result<(), StoreError> {
        self.save_list(ROLE_MAPPINGS_FILE, mappings).await
    }

    async fn put_role_mapping(&self, mapping: &RoleMapping) -> Result<(), StoreError> {
        self.modify_list(ROLE_MAPPINGS_FILE, |mappings| {
            edit::put_role_mapping(mappings, mapping)
        })
        .await
    }

    async fn remove_role_mappings(
        &self,
        user_email: &str,
        dataset_id: Option<&str>,
    ) -> Result<usize, StoreError> {
        self.modify_list(ROLE_MAPPINGS_FILE, |mappings| {
            edit::remove_role_mappings(mappings, user_email, dataset_id)
        })
        .await
    }

    async fn load_report_access(&self) -> Result<Vec<ReportAccess>, StoreError> {
        self.load_list(REPORT_ACCESS_FILE).await
    }

    async fn save_report_access(&self, entries: &[ReportAccess]) -> Result<(), StoreError> {
        self.save_list(REPORT_ACCESS_FILE, entries).await
    }

    async fn put_report_access(&self, entry: &ReportAccess) -> Result<(), StoreError> {
        self.modify_list(REPORT_ACCESS_FILE, |entries| {
            edit::put_report_access(entries, entry)
        })
        .await
    }

    async fn remove_report_access(&self, user_email: &str) -> Result<bool, StoreError> {
        self.modify_list(REPORT_ACCESS_FILE, |entries| {
            edit::remove_report_access(entries, user_email)
        })
        .await
    }

    async fn load_admin_users(&self) -> Result<Vec<AdminUser>, StoreError> {
        self.load_list(ADMIN_USERS_FILE).await
    }

    async fn save_admin_users(&self, admins: &[AdminUser]) -> Result<(), StoreError> {
        self.save_list(ADMIN_USERS_FILE, admins).await
    }

    async fn put_admin_user(&self, admin: &AdminUser) -> Result<AdminUser, StoreError> {
        self.modify_list(ADMIN_USERS_FILE, |admins| edit::put_admin_user(admins, admin))
            .await
    }

    async fn remove_admin_user(&self, email: &str) -> Result<bool, StoreError> {
        self.modify_list(ADMIN_USERS_FILE, |admins| edit::remove_admin_user(admins, email))
            .await
    }

    async fn record_activity(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        let path = self.path(ACTIVITY_LOG_FILE);
        let mut line = serde_json::to_vec(record).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| io_error(&path, source))?;
        file.write_all(&line)
            .await
            .map_err(|source| io_error(&path, source))?;
        file.flush().await.map_err(|source| io_error(&path, source))?;

        Ok(())
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let path = self.path(ACTIVITY_LOG_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&path, source)),
        };

        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<ActivityRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed activity line");
                }
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}
