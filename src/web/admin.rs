//! Admin JSON endpoints
//!
//! Every endpoint answers `{"success": true, "message": ...}` or
//! `{"success": false, "error": ...}`. Mutations are attributed to the acting admin.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    access::is_in_allow_list,
    auth::extractors::RequireAdmin,
    store::{
        delete_admin_user, delete_report_access, delete_role_mappings, email_key,
        upsert_admin_user, upsert_report_access, upsert_role_mapping, StoreError,
    },
    AppState,
};

#[derive(Debug, Serialize)]
pub struct ApiSuccess {
    success: bool,
    message: String,
}

impl ApiSuccess {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Failure answered as `{"success": false, "error": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Admin update failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "success": false,
                "error": self.message
            })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<ApiSuccess>, ApiError>;

/// Trimmed email, rejecting blanks and values without `@`
fn require_email(value: &str) -> Result<String, ApiError> {
    let email = value.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request(format!("Invalid email address: '{}'", email)));
    }
    Ok(email.to_string())
}

fn require_non_blank(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Trimmed, non-blank entries
fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMappingRequest {
    pub user_email: String,
    pub dataset_id: String,
    pub roles: Vec<String>,
}

pub async fn save_mapping_handler(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<SaveMappingRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let user_email = require_email(&request.user_email)?;
    let dataset_id = require_non_blank(&request.dataset_id, "datasetId")?;
    let roles = clean_list(request.roles);
    if roles.is_empty() {
        return Err(ApiError::bad_request("At least one role is required"));
    }

    let mapping = upsert_role_mapping(
        state.store.as_ref(),
        &user_email,
        &dataset_id,
        roles,
        &admin.email,
    )
    .await?;

    tracing::info!(
        admin = %admin.email,
        email = %mapping.user_email,
        dataset_id = %mapping.dataset_id,
        roles = ?mapping.roles,
        "Role mapping saved"
    );
    Ok(ApiSuccess::new("Mapping saved successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMappingRequest {
    pub user_email: String,
    #[serde(default)]
    pub dataset_id: Option<String>,
}

pub async fn delete_mapping_handler(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<DeleteMappingRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let user_email = require_email(&request.user_email)?;
    // A blank dataset means every dataset
    let dataset_id = request
        .dataset_id
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let removed =
        delete_role_mappings(state.store.as_ref(), &user_email, dataset_id.as_deref()).await?;

    tracing::info!(
        admin = %admin.email,
        email = %user_email,
        dataset_id = ?dataset_id,
        removed = removed,
        "Role mappings deleted"
    );
    Ok(ApiSuccess::new("Mapping deleted successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReportAccessRequest {
    pub user_email: String,
    #[serde(default)]
    pub report_ids: Vec<String>,
}

pub async fn save_report_access_handler(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<SaveReportAccessRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let user_email = require_email(&request.user_email)?;

    let entry = upsert_report_access(
        state.store.as_ref(),
        &user_email,
        clean_list(request.report_ids),
        &admin.email,
    )
    .await?;

    tracing::info!(
        admin = %admin.email,
        email = %entry.user_email,
        reports = entry.report_count(),
        "Report access saved"
    );
    Ok(ApiSuccess::new("Report access saved successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReportAccessRequest {
    pub user_email: String,
}

pub async fn delete_report_access_handler(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<DeleteReportAccessRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let user_email = require_email(&request.user_email)?;

    let removed = delete_report_access(state.store.as_ref(), &user_email).await?;

    tracing::info!(
        admin = %admin.email,
        email = %user_email,
        removed = removed,
        "Report access deleted"
    );
    Ok(ApiSuccess::new("Report access deleted successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAdminRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_super_admin: bool,
}

pub async fn add_admin_handler(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<AddAdminRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let email = require_email(&request.email)?;

    let added = upsert_admin_user(
        state.store.as_ref(),
        &email,
        request.name.trim(),
        request.is_super_admin,
        &admin.email,
    )
    .await?;

    tracing::info!(
        admin = %admin.email,
        email = %added.email,
        is_super_admin = added.is_super_admin,
        "Admin user saved"
    );
    Ok(ApiSuccess::new(format!("{} is now an admin", added.email)))
}

#[derive(Debug, Deserialize)]
pub struct RemoveAdminRequest {
    pub email: String,
}

pub async fn remove_admin_handler(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<RemoveAdminRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let email = require_email(&request.email)?;

    if email_key(&email) == email_key(&admin.email) {
        return Err(ApiError::bad_request("You cannot remove yourself as an admin"));
    }

    let removed = delete_admin_user(state.store.as_ref(), &email).await?;
    if !removed {
        return Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("{} is not an admin", email),
        });
    }

    let still_allow_listed = is_in_allow_list(&state.config.admin_emails, &email);
    tracing::info!(
        admin = %admin.email,
        email = %email,
        still_allow_listed = still_allow_listed,
        "Admin user removed"
    );

    let message = if still_allow_listed {
        format!("{} removed from the admin store but remains an admin through ADMIN_EMAILS", email)
    } else {
        format!("{} is no longer an admin", email)
    };
    Ok(ApiSuccess::new(message))
}
