use std::collections::BTreeMap;

use super::error::AppError;
use super::templates::{
    AdminTemplate, DatasetRolesView, IndexTemplate, ReportAccessView, ReportListTemplate,
    ViewReportTemplate,
};
use crate::{
    access::{filter_reports_for_user, is_admin, resolve_report_access},
    activity::{record_view, RECENT_ACTIVITY_LIMIT},
    auth::extractors::{ClientMeta, CurrentUser, RequireAdmin},
    auth::session::SessionUser,
    reporting::{negotiate_embed_token, Report, ReportingError},
    store::ReportAccess,
    AppState,
};
use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};

/// Liveness check - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness check - checks if the config store answers
///
/// Returns 503 Service Unavailable when the store cannot be reached
/// (for SQL with fallback, only when the file store fails too).
pub async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ready".to_string()),
        Err(e) => {
            tracing::warn!(
                backend = state.store.backend_name(),
                error = %e,
                "Readiness check failed: config store unavailable"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "not ready: config store unavailable".to_string(),
            )
        }
    }
}

async fn user_is_admin(state: &AppState, user: &SessionUser) -> bool {
    is_admin(state.store.as_ref(), &state.config.admin_emails, &user.email).await
}

pub async fn index_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let is_admin = user_is_admin(&state, &user).await;
    let html = IndexTemplate { user, is_admin }.render()?;
    Ok(Html(html))
}

/// Every report in the workspace (admins only)
pub async fn reports_handler(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
) -> Result<impl IntoResponse, AppError> {
    let reports = state.reporting.list_reports().await?;

    let html = ReportListTemplate {
        user,
        is_admin: true,
        heading: "All Reports",
        empty_message: "No reports found in this workspace.",
        reports,
    }
    .render()?;
    Ok(Html(html))
}

/// Reports in the user's access set; admins see every report
pub async fn my_reports_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let is_admin = user_is_admin(&state, &user).await;

    let reports = if is_admin {
        state.reporting.list_reports().await?
    } else {
        let allowed = resolve_report_access(state.store.as_ref(), &user.email).await?;
        if allowed.is_empty() {
            Vec::new()
        } else {
            let all = state.reporting.list_reports().await?;
            filter_reports_for_user(&all, &allowed)
        }
    };

    tracing::debug!(
        email = %user.email,
        is_admin = is_admin,
        visible_reports = reports.len(),
        "Filtered reports for user"
    );

    let html = ReportListTemplate {
        user,
        is_admin,
        heading: "My Reports",
        empty_message: "No reports have been assigned to you yet. Contact an administrator to request access.",
        reports,
    }
    .render()?;
    Ok(Html(html))
}

/// Embedded report page
///
/// Access is checked before the report is fetched; the embed token carries an
/// identity only when the dataset enforces row-level security.
pub async fn view_report_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(report_id): Path<String>,
    meta: ClientMeta,
) -> Result<impl IntoResponse, AppError> {
    let is_admin = user_is_admin(&state, &user).await;

    if !is_admin {
        let allowed = resolve_report_access(state.store.as_ref(), &user.email).await?;
        if !allowed.contains(&report_id) {
            return Err(AppError::ReportDenied { report_id });
        }
    }

    let report = match state.reporting.get_report(&report_id).await {
        Ok(report) => report,
        Err(ReportingError::Upstream { status: 404, .. }) => {
            return Err(AppError::ReportNotFound { report_id });
        }
        Err(e) => return Err(e.into()),
    };

    let session = negotiate_embed_token(
        state.reporting.as_ref(),
        state.store.as_ref(),
        &report.id,
        &report.dataset_id,
        &user.email,
    )
    .await?;

    record_view(state.store.as_ref(), &user, &report, &meta).await;

    let html = ViewReportTemplate {
        user,
        is_admin,
        report_id: report.id,
        report_name: report.name,
        embed_url: report.embed_url,
        embed_token: session.token.token,
        filtered: session.mode.is_filtered(),
        roles: session.roles.into_iter().collect(),
    }
    .render()?;
    Ok(Html(html))
}

/// Group reports by dataset, keeping the workspace's order of first appearance
fn datasets_of(reports: &[Report]) -> Vec<(String, Vec<String>)> {
    let mut datasets: Vec<(String, Vec<String>)> = Vec::new();
    for report in reports {
        match datasets.iter_mut().find(|(id, _)| *id == report.dataset_id) {
            Some((_, names)) => names.push(report.name.clone()),
            None => datasets.push((report.dataset_id.clone(), vec![report.name.clone()])),
        }
    }
    datasets
}

fn report_access_views(entries: Vec<ReportAccess>, reports: &[Report]) -> Vec<ReportAccessView> {
    let names: BTreeMap<&str, &str> = reports
        .iter()
        .map(|r| (r.id.as_str(), r.name.as_str()))
        .collect();

    entries
        .into_iter()
        .map(|entry| {
            let report_names = entry
                .report_ids
                .iter()
                .map(|id| names.get(id.as_str()).copied().unwrap_or(id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            ReportAccessView {
                user_email: entry.user_email,
                report_ids: entry.report_ids.into_iter().collect(),
                report_names,
                created_by: entry.created_by,
            }
        })
        .collect()
}

/// Admin panel
pub async fn admin_handler(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
) -> Result<impl IntoResponse, AppError> {
    let reports = state.reporting.list_reports().await?;

    // A dataset whose roles cannot be listed is shown without roles
    let mut datasets = Vec::new();
    for (dataset_id, report_names) in datasets_of(&reports) {
        let roles = match state.reporting.list_dataset_roles(&dataset_id).await {
            Ok(roles) => roles,
            Err(e) => {
                tracing::warn!(dataset_id = %dataset_id, error = %e, "Failed to list dataset roles");
                Vec::new()
            }
        };
        datasets.push(DatasetRolesView {
            dataset_id,
            report_names: report_names.join(", "),
            roles,
        });
    }

    let store = state.store.as_ref();
    let role_mappings = store.load_role_mappings().await?;
    let report_access = report_access_views(store.load_report_access().await?, &reports);
    let admins = store.load_admin_users().await?;

    let activity = match store.recent_activity(RECENT_ACTIVITY_LIMIT).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load recent activity");
            Vec::new()
        }
    };

    tracing::debug!(
        email = %user.email,
        reports = reports.len(),
        datasets = datasets.len(),
        mappings = role_mappings.len(),
        "Rendering admin panel"
    );

    let html = AdminTemplate {
        user,
        is_admin: true,
        store_backend: store.backend_name(),
        reports,
        datasets,
        role_mappings,
        report_access,
        admins,
        activity,
    }
    .render()?;
    Ok(Html(html))
}
