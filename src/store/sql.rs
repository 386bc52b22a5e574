use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::{
    email_key, ActivityRecord, ActivityType, AdminUser, ConfigStore, ReportAccess, RoleMapping,
    StoreError,
};
use crate::config::DatabaseConfig;

/// Row type for role mapping queries
#[derive(FromRow)]
struct RoleMappingRow {
    user_email: String,
    dataset_id: String,
    roles: Json<Vec<String>>,
    created_at: Option<DateTime<Utc>>,
    created_by: String,
}

impl From<RoleMappingRow> for RoleMapping {
    fn from(row: RoleMappingRow) -> Self {
        RoleMapping {
            user_email: row.user_email,
            dataset_id: row.dataset_id,
            roles: row.roles.0.into_iter().collect(),
            created_at: row.created_at,
            created_by: row.created_by,
        }
    }
}

/// Row type for report access queries
#[derive(FromRow)]
struct ReportAccessRow {
    user_email: String,
    report_ids: Json<Vec<String>>,
    created_at: Option<DateTime<Utc>>,
    created_by: String,
}

impl From<ReportAccessRow> for ReportAccess {
    fn from(row: ReportAccessRow) -> Self {
        ReportAccess {
            user_email: row.user_email,
            report_ids: row.report_ids.0.into_iter().collect(),
            created_at: row.created_at,
            created_by: row.created_by,
        }
    }
}

#[derive(FromRow)]
struct AdminUserRow {
    email: String,
    name: String,
    created_by: String,
    is_super_admin: bool,
    created_at: Option<DateTime<Utc>>,
}

impl From<AdminUserRow> for AdminUser {
    fn from(row: AdminUserRow) -> Self {
        AdminUser {
            email: row.email,
            name: row.name,
            created_by: row.created_by,
            is_super_admin: row.is_super_admin,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: String,
    user_email: String,
    user_name: String,
    activity_type: String,
    report_id: Option<String>,
    report_name: Option<String>,
    timestamp: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl ActivityRow {
    fn try_into_record(self) -> Result<ActivityRecord, StoreError> {
        let activity_type = ActivityType::parse(&self.activity_type).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "unknown activity type '{}' on record {}",
                self.activity_type, self.id
            ))
        })?;

        Ok(ActivityRecord {
            id: self.id,
            user_email: self.user_email,
            user_name: self.user_name,
            activity_type,
            report_id: self.report_id,
            report_name: self.report_name,
            timestamp: self.timestamp,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        })
    }
}

const UPSERT_ROLE_MAPPING: &str = r#"
    INSERT INTO role_mappings (email_key, dataset_id, user_email, roles, created_at, created_by)
    VALUES ($1, $2, $3, $4, COALESCE($5, NOW()), $6)
    ON CONFLICT (email_key, dataset_id) DO UPDATE
    SET user_email = EXCLUDED.user_email,
        roles = EXCLUDED.roles,
        created_at = EXCLUDED.created_at,
        created_by = EXCLUDED.created_by
"#;

const UPSERT_REPORT_ACCESS: &str = r#"
    INSERT INTO report_access (email_key, user_email, report_ids, created_at, created_by)
    VALUES ($1, $2, $3, COALESCE($4, NOW()), $5)
    ON CONFLICT (email_key) DO UPDATE
    SET user_email = EXCLUDED.user_email,
        report_ids = EXCLUDED.report_ids,
        created_at = EXCLUDED.created_at,
        created_by = EXCLUDED.created_by
"#;

/// An existing admin keeps its email, creator and creation time
const UPSERT_ADMIN_USER: &str = r#"
    INSERT INTO admin_users (email_key, email, name, created_by, is_super_admin, created_at)
    VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()))
    ON CONFLICT (email_key) DO UPDATE
    SET name = EXCLUDED.name,
        is_super_admin = EXCLUDED.is_super_admin
    RETURNING email, name, created_by, is_super_admin, created_at
"#;

fn upsert_role_mapping_query(
    mapping: &RoleMapping,
) -> sqlx::query::Query<'static, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let roles: Vec<String> = mapping.roles.iter().cloned().collect();
    sqlx::query(UPSERT_ROLE_MAPPING)
        .bind(email_key(&mapping.user_email))
        .bind(mapping.dataset_id.clone())
        .bind(mapping.user_email.clone())
        .bind(Json(roles))
        .bind(mapping.created_at)
        .bind(mapping.created_by.clone())
}

fn upsert_report_access_query(
    entry: &ReportAccess,
) -> sqlx::query::Query<'static, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let report_ids: Vec<String> = entry.report_ids.iter().cloned().collect();
    sqlx::query(UPSERT_REPORT_ACCESS)
        .bind(email_key(&entry.user_email))
        .bind(entry.user_email.clone())
        .bind(Json(report_ids))
        .bind(entry.created_at)
        .bind(entry.created_by.clone())
}

fn upsert_admin_user_query(
    admin: &AdminUser,
) -> sqlx::query::QueryAs<'static, sqlx::Postgres, AdminUserRow, sqlx::postgres::PgArguments> {
    sqlx::query_as(UPSERT_ADMIN_USER)
        .bind(email_key(&admin.email))
        .bind(admin.email.clone())
        .bind(admin.name.clone())
        .bind(admin.created_by.clone())
        .bind(admin.is_super_admin)
        .bind(admin.created_at)
}

/// PostgreSQL backend
///
/// Every table is keyed on the lowercased email (`email_key`), so lookups stay
/// case-insensitive while the email is stored as entered. List saves upsert by
/// key and never delete; removal happens only through the `remove_*` calls.
pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a bounded pool that health-checks connections and recycles them
    /// before a remote server's own idle timeout can cut them off.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .test_before_acquire(true)
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::database("connect", e))?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::database("migrate", e.into()))
    }
}

#[async_trait]
impl ConfigStore for SqlStore {
    fn backend_name(&self) -> &'static str {
        "sql"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("ping", e))?;
        Ok(())
    }

    async fn load_role_mappings(&self) -> Result<Vec<RoleMapping>, StoreError> {
        let rows: Vec<RoleMappingRow> = sqlx::query_as(
            r#"
            SELECT user_email, dataset_id, roles, created_at, created_by
            FROM role_mappings
            ORDER BY email_key, dataset_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database("load_role_mappings", e))?;

        Ok(rows.into_iter().map(RoleMapping::from).collect())
    }

    async fn save_role_mappings(&self, mappings: &[RoleMapping]) -> Result<(), StoreError> {
        let op = "save_role_mappings";
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::database(op, e))?;

        for mapping in mappings {
            upsert_role_mapping_query(mapping)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::database(op, e))?;
        }

        tx.commit().await.map_err(|e| StoreError::database(op, e))
    }

    async fn put_role_mapping(&self, mapping: &RoleMapping) -> Result<(), StoreError> {
        upsert_role_mapping_query(mapping)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("put_role_mapping", e))?;
        Ok(())
    }

    async fn remove_role_mappings(
        &self,
        user_email: &str,
        dataset_id: Option<&str>,
    ) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_mappings
            WHERE email_key = $1
              AND ($2::text IS NULL OR dataset_id = $2)
            "#,
        )
        .bind(email_key(user_email))
        .bind(dataset_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database("remove_role_mappings", e))?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn load_report_access(&self) -> Result<Vec<ReportAccess>, StoreError> {
        let rows: Vec<ReportAccessRow> = sqlx::query_as(
            r#"
            SELECT user_email, report_ids, created_at, created_by
            FROM report_access
            ORDER BY email_key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database("load_report_access", e))?;

        Ok(rows.into_iter().map(ReportAccess::from).collect())
    }

    async fn save_report_access(&self, entries: &[ReportAccess]) -> Result<(), StoreError> {
        let op = "save_report_access";
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::database(op, e))?;

        for entry in entries {
            upsert_report_access_query(entry)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::database(op, e))?;
        }

        tx.commit().await.map_err(|e| StoreError::database(op, e))
    }

    async fn put_report_access(&self, entry: &ReportAccess) -> Result<(), StoreError> {
        upsert_report_access_query(entry)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("put_report_access", e))?;
        Ok(())
    }

    async fn remove_report_access(&self, user_email: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM report_access WHERE email_key = $1")
            .bind(email_key(user_email))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("remove_report_access", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_admin_users(&self) -> Result<Vec<AdminUser>, StoreError> {
        let rows: Vec<AdminUserRow> = sqlx::query_as(
            r#"
            SELECT email, name, created_by, is_super_admin, created_at
            FROM admin_users
            ORDER BY email_key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database("load_admin_users", e))?;

        Ok(rows.into_iter().map(AdminUser::from).collect())
    }

    async fn save_admin_users(&self, admins: &[AdminUser]) -> Result<(), StoreError> {
        let op = "save_admin_users";
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::database(op, e))?;

        for admin in admins {
            upsert_admin_user_query(admin)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| StoreError::database(op, e))?;
        }

        tx.commit().await.map_err(|e| StoreError::database(op, e))
    }

    async fn put_admin_user(&self, admin: &AdminUser) -> Result<AdminUser, StoreError> {
        let row = upsert_admin_user_query(admin)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::database("put_admin_user", e))?;
        Ok(row.into())
    }

    async fn remove_admin_user(&self, email: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM admin_users WHERE email_key = $1")
            .bind(email_key(email))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("remove_admin_user", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_activity(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activity_log
                (id, user_email, user_name, activity_type, report_id, report_name, timestamp, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_email)
        .bind(&record.user_name)
        .bind(record.activity_type.as_str())
        .bind(&record.report_id)
        .bind(&record.report_name)
        .bind(record.timestamp)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database("record_activity", e))?;

        Ok(())
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            r#"
            SELECT id, user_email, user_name, activity_type, report_id, report_name,
                   timestamp, ip_address, user_agent
            FROM activity_log
            ORDER BY timestamp DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database("recent_activity", e))?;

        rows.into_iter().map(ActivityRow::try_into_record).collect()
    }
}
