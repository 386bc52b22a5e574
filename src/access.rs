//! Access resolution for reports, row-level-security roles and the admin panel
//!
//! This module is the single source of truth for who sees what:
//! - A user with no role mapping for a dataset gets `DEFAULT_ROLE`, so external
//!   customers are filtered by their email without manual setup.
//! - A user with no report access record sees no reports at all.
//! - Admins come from the admin store and from the configured allow-list.

use std::collections::BTreeSet;

use crate::reporting::Report;
use crate::store::{email_key, AdminUser, ConfigStore, StoreError};

/// Role applied to any user without an explicit mapping for a dataset
pub const DEFAULT_ROLE: &str = "Customer";

/// Creator recorded on admins seeded from configuration
pub const BOOTSTRAP_CREATOR: &str = "system";

/// Resolve the row-level-security roles for a user on a dataset
///
/// Falls back to `DEFAULT_ROLE` when no mapping exists; absence is not an error.
pub async fn resolve_roles(
    store: &dyn ConfigStore,
    user_email: &str,
    dataset_id: &str,
) -> Result<BTreeSet<String>, StoreError> {
    let mappings = store.load_role_mappings().await?;

    let roles = mappings
        .into_iter()
        .find(|m| m.matches(user_email, dataset_id))
        .map(|m| m.roles)
        .unwrap_or_else(|| BTreeSet::from([DEFAULT_ROLE.to_string()]));

    tracing::debug!(
        email = %user_email,
        dataset_id = %dataset_id,
        roles = ?roles,
        "Resolved dataset roles"
    );

    Ok(roles)
}

/// Resolve the report IDs a user may list and open
///
/// Returns the empty set when no record exists: no record means no reports.
pub async fn resolve_report_access(
    store: &dyn ConfigStore,
    user_email: &str,
) -> Result<BTreeSet<String>, StoreError> {
    let entries = store.load_report_access().await?;

    Ok(entries
        .into_iter()
        .find(|e| e.matches_email(user_email))
        .map(|e| e.report_ids)
        .unwrap_or_default())
}

/// Check an email against the configured allow-list (case-insensitive)
pub fn is_in_allow_list(allow_list: &[String], user_email: &str) -> bool {
    let key = email_key(user_email);
    !key.is_empty() && allow_list.iter().any(|admin| email_key(admin) == key)
}

/// Check whether a user may use the admin panel
///
/// True when the email is in the admin store or in the allow-list. If the store
/// cannot be read, the allow-list alone decides.
pub async fn is_admin(store: &dyn ConfigStore, allow_list: &[String], user_email: &str) -> bool {
    if is_in_allow_list(allow_list, user_email) {
        return true;
    }

    match store.load_admin_users().await {
        Ok(admins) => admins.iter().any(|a| a.matches_email(user_email)),
        Err(e) => {
            tracing::warn!(
                email = %user_email,
                error = %e,
                "Admin store unavailable - using configured allow-list only"
            );
            false
        }
    }
}

/// Seed the admin store with allow-listed emails that are not yet present.
/// Returns how many admins were added.
pub async fn bootstrap_admins(
    store: &dyn ConfigStore,
    allow_list: &[String],
) -> Result<usize, StoreError> {
    let mut admins = store.load_admin_users().await?;
    let mut added = 0;

    for email in allow_list {
        if email.trim().is_empty() || admins.iter().any(|a| a.matches_email(email)) {
            continue;
        }
        let admin = AdminUser {
            email: email.trim().to_string(),
            name: String::new(),
            created_by: BOOTSTRAP_CREATOR.to_string(),
            is_super_admin: true,
            created_at: Some(chrono::Utc::now()),
        };
        admins.push(store.put_admin_user(&admin).await?);
        added += 1;
    }

    Ok(added)
}

/// Keep only the reports whose IDs are in the allowed set, preserving workspace order
pub fn filter_reports_for_user(reports: &[Report], allowed: &BTreeSet<String>) -> Vec<Report> {
    reports
        .iter()
        .filter(|report| allowed.contains(&report.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{upsert_admin_user, upsert_report_access, upsert_role_mapping};

    fn report(id: &str) -> Report {
        Report {
            id: id.to_string(),
            name: format!("Report {id}"),
            dataset_id: "ds-1".to_string(),
            embed_url: format!("https://app.powerbi.com/reportEmbed?reportId={id}"),
            web_url: None,
        }
    }

    fn allow_list(emails: &[&str]) -> Vec<String> {
        emails.iter().map(|e| e.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unmapped_email_gets_default_role_exactly() {
        let store = MemoryStore::default();
        upsert_role_mapping(&store, "mapped@example.com", "ds-1", vec!["Sales".to_string()], "admin")
            .await
            .unwrap();

        for email in ["stranger@customer.com", "MAPPED@example.com"] {
            // The second email is mapped, but for another dataset
            let roles = resolve_roles(&store, email, "ds-2").await.unwrap();
            assert_eq!(roles, BTreeSet::from([DEFAULT_ROLE.to_string()]));
        }
    }

    #[tokio::test]
    async fn test_mapped_email_gets_exact_roles_regardless_of_case() {
        let store = MemoryStore::default();
        upsert_role_mapping(
            &store,
            "Alice@Example.com",
            "ds-1",
            vec!["Sales".to_string(), "EMEA".to_string()],
            "admin",
        )
        .await
        .unwrap();

        let expected = BTreeSet::from(["EMEA".to_string(), "Sales".to_string()]);
        for email in ["alice@example.com", "ALICE@EXAMPLE.COM", "Alice@Example.com"] {
            assert_eq!(resolve_roles(&store, email, "ds-1").await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_missing_report_access_is_empty() {
        let store = MemoryStore::default();
        upsert_report_access(&store, "other@example.com", vec!["r1".to_string()], "admin")
            .await
            .unwrap();

        let reports = resolve_report_access(&store, "nobody@example.com").await.unwrap();
        assert!(reports.is_empty());

        let reports = resolve_report_access(&store, "OTHER@example.com").await.unwrap();
        assert_eq!(reports, BTreeSet::from(["r1".to_string()]));
    }

    #[tokio::test]
    async fn test_store_failure_propagates_from_resolvers() {
        let store = MemoryStore::failing();
        assert!(resolve_roles(&store, "a@example.com", "ds-1").await.is_err());
        assert!(resolve_report_access(&store, "a@example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_admin_from_store_only() {
        let store = MemoryStore::default();
        upsert_admin_user(&store, "stored@example.com", "Stored", false, "root@example.com")
            .await
            .unwrap();

        let env_admins = allow_list(&["env@example.com"]);
        assert!(is_admin(&store, &env_admins, "Stored@Example.com").await);
        assert!(!is_admin(&store, &env_admins, "someone@example.com").await);
    }

    #[tokio::test]
    async fn test_admin_from_allow_list_only() {
        let store = MemoryStore::default();
        let env_admins = allow_list(&[" Env@Example.com "]);

        assert!(is_admin(&store, &env_admins, "env@example.com").await);
    }

    #[tokio::test]
    async fn test_allow_list_works_when_store_is_down() {
        let store = MemoryStore::failing();
        let env_admins = allow_list(&["env@example.com"]);

        assert!(is_admin(&store, &env_admins, "env@example.com").await);
        assert!(!is_admin(&store, &env_admins, "stored@example.com").await);
    }

    #[test]
    fn test_empty_email_is_never_allow_listed() {
        assert!(!is_in_allow_list(&allow_list(&[""]), ""));
        assert!(!is_in_allow_list(&allow_list(&["a@example.com"]), "  "));
    }

    #[tokio::test]
    async fn test_bootstrap_admins_is_idempotent() {
        let store = MemoryStore::default();
        upsert_admin_user(&store, "existing@example.com", "Existing", false, "root")
            .await
            .unwrap();
        let env_admins = allow_list(&["EXISTING@example.com", "new@example.com", ""]);

        assert_eq!(bootstrap_admins(&store, &env_admins).await.unwrap(), 1);
        assert_eq!(bootstrap_admins(&store, &env_admins).await.unwrap(), 0);

        let admins = store.load_admin_users().await.unwrap();
        assert_eq!(admins.len(), 2);
        let seeded = admins.iter().find(|a| a.email == "new@example.com").unwrap();
        assert!(seeded.is_super_admin);
        assert_eq!(seeded.created_by, BOOTSTRAP_CREATOR);
        let existing = admins.iter().find(|a| a.email == "existing@example.com").unwrap();
        assert!(!existing.is_super_admin);
    }

    #[test]
    fn test_filter_reports_preserves_workspace_order() {
        let reports = vec![report("r1"), report("r2"), report("r3")];
        let allowed = BTreeSet::from(["r3".to_string(), "r1".to_string(), "gone".to_string()]);

        let visible = filter_reports_for_user(&reports, &allowed);
        let ids: Vec<&str> = visible.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
    }
}
