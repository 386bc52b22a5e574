use crate::auth::session::SessionUser;
use crate::reporting::Report;
use crate::store::{ActivityRecord, AdminUser, RoleMapping};
use askama::Template;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub user: SessionUser,
    pub is_admin: bool,
}

/// Used by both the full workspace listing and the per-user listing
#[derive(Template)]
#[template(path = "reports.html")]
pub struct ReportListTemplate {
    pub user: SessionUser,
    pub is_admin: bool,
    pub heading: &'static str,
    pub empty_message: &'static str,
    pub reports: Vec<Report>,
}

#[derive(Template)]
#[template(path = "view_report.html")]
pub struct ViewReportTemplate {
    pub user: SessionUser,
    pub is_admin: bool,
    pub report_id: String,
    pub report_name: String,
    pub embed_url: String,
    pub embed_token: String,
    pub filtered: bool,
    pub roles: Vec<String>,
}

/// RLS roles defined on one dataset, with the reports built on it
pub struct DatasetRolesView {
    pub dataset_id: String,
    pub report_names: String,
    pub roles: Vec<String>,
}

/// A report access record with report IDs resolved to names where possible
pub struct ReportAccessView {
    pub user_email: String,
    pub report_ids: Vec<String>,
    pub report_names: String,
    pub created_by: String,
}

#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminTemplate {
    pub user: SessionUser,
    pub is_admin: bool,
    pub store_backend: &'static str,
    pub reports: Vec<Report>,
    pub datasets: Vec<DatasetRolesView>,
    pub role_mappings: Vec<RoleMapping>,
    pub report_access: Vec<ReportAccessView>,
    pub admins: Vec<AdminUser>,
    pub activity: Vec<ActivityRecord>,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub status: u16,
    pub title: String,
    pub message: String,
    pub details: Option<String>,
    /// Set on admin-denied pages
    pub email: Option<String>,
    pub admins: Vec<String>,
}
