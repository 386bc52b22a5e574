//! Single-record edits applied to an in-memory list
//!
//! Used by the backends that persist whole lists (`file`, and the in-memory
//! test store) to implement the per-key operations of `ConfigStore`.

use super::{AdminUser, ReportAccess, RoleMapping};

/// Insert or replace the mapping keyed by (email, dataset)
pub(crate) fn put_role_mapping(mappings: &mut Vec<RoleMapping>, mapping: &RoleMapping) {
    mappings.retain(|m| !m.matches(&mapping.user_email, &mapping.dataset_id));
    mappings.push(mapping.clone());
}

/// Returns the number of mappings removed
pub(crate) fn remove_role_mappings(
    mappings: &mut Vec<RoleMapping>,
    user_email: &str,
    dataset_id: Option<&str>,
) -> usize {
    let before = mappings.len();
    match dataset_id {
        Some(dataset_id) => mappings.retain(|m| !m.matches(user_email, dataset_id)),
        None => mappings.retain(|m| !m.matches_email(user_email)),
    }
    before - mappings.len()
}

pub(crate) fn put_report_access(entries: &mut Vec<ReportAccess>, entry: &ReportAccess) {
    entries.retain(|e| !e.matches_email(&entry.user_email));
    entries.push(entry.clone());
}

pub(crate) fn remove_report_access(entries: &mut Vec<ReportAccess>, user_email: &str) -> bool {
    let before = entries.len();
    entries.retain(|e| !e.matches_email(user_email));
    entries.len() != before
}

/// Add the admin, or update name and flag of the existing record.
/// Returns the stored record; email, creator and creation time of an existing admin are kept.
pub(crate) fn put_admin_user(admins: &mut Vec<AdminUser>, admin: &AdminUser) -> AdminUser {
    match admins.iter_mut().find(|a| a.matches_email(&admin.email)) {
        Some(existing) => {
            existing.name = admin.name.clone();
            existing.is_super_admin = admin.is_super_admin;
            existing.clone()
        }
        None => {
            admins.push(admin.clone());
            admin.clone()
        }
    }
}

pub(crate) fn remove_admin_user(admins: &mut Vec<AdminUser>, email: &str) -> bool {
    let before = admins.len();
    admins.retain(|a| !a.matches_email(email));
    admins.len() != before
}
