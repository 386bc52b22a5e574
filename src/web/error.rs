use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use thiserror::Error;

use super::templates::ErrorTemplate;
use crate::reporting::{EmbedError, ReportingError};
use crate::store::StoreError;

/// Errors surfaced by page handlers
#[derive(Debug, Error)]
pub enum AppError {
    /// No valid session; the browser is sent to the login page
    #[error("authentication required")]
    Unauthenticated,

    /// Signed in, but not an admin
    #[error("admin access required (signed in as {email})")]
    Forbidden { email: String, admins: Vec<String> },

    /// Signed in, but the report is not in the user's access set
    #[error("no access to report {report_id}")]
    ReportDenied { report_id: String },

    /// The workspace has no report with this ID
    #[error("report {report_id} not found")]
    ReportNotFound { report_id: String },

    #[error(transparent)]
    Reporting(#[from] ReportingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),

    #[error("{0}")]
    Internal(String),
}

impl From<EmbedError> for AppError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::Reporting(e) => AppError::Reporting(e),
            EmbedError::Roles(e) => AppError::Store(e),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::SEE_OTHER,
            AppError::Forbidden { .. } | AppError::ReportDenied { .. } => StatusCode::FORBIDDEN,
            AppError::ReportNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Reporting(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Template(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn page(&self) -> ErrorTemplate {
        let status = self.status();
        let mut page = ErrorTemplate {
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            message: String::new(),
            details: None,
            email: None,
            admins: Vec::new(),
        };

        match self {
            AppError::Forbidden { email, admins } => {
                page.title = "Unauthorized".to_string();
                page.message = "Admin access required.".to_string();
                page.email = Some(email.clone());
                page.admins = admins.clone();
            }
            AppError::ReportDenied { .. } => {
                page.message = "You do not have access to this report. \
                                Contact an administrator to request access."
                    .to_string();
            }
            AppError::ReportNotFound { .. } => {
                page.message = "Report not found.".to_string();
            }
            AppError::Reporting(ReportingError::Upstream { status, body }) => {
                page.message = format!("The reporting service returned an error ({}).", status);
                page.details = Some(body.clone());
            }
            AppError::Reporting(e) => {
                page.message = "The reporting service could not be reached.".to_string();
                page.details = Some(e.to_string());
            }
            _ => {
                page.message = "Something went wrong. Please try again later.".to_string();
            }
        }

        page
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthenticated => return Redirect::to("/login").into_response(),
            AppError::Forbidden { email, .. } => {
                tracing::warn!(email = %email, "Admin access denied");
            }
            AppError::ReportDenied { report_id } => {
                tracing::warn!(report_id = %report_id, "Report access denied");
            }
            AppError::ReportNotFound { report_id } => {
                tracing::info!(report_id = %report_id, "Report not found");
            }
            AppError::Reporting(e) => {
                tracing::error!(error = %e, "Reporting API error");
            }
            AppError::Store(e) => {
                tracing::error!(error = %e, "Config store error");
            }
            AppError::Template(e) => {
                tracing::error!(error = %e, "Template rendering failed");
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
            }
        }

        let status = self.status();
        match self.page().render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(_) => (status, "Error").into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unauthenticated_redirects_to_login() {
        let response = AppError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login");
    }

    #[tokio::test]
    async fn test_forbidden_names_email_and_admins() {
        let response = AppError::Forbidden {
            email: "user@example.com".to_string(),
            admins: vec!["boss@example.com".to_string()],
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_text(response).await;
        assert!(body.contains("user@example.com"));
        assert!(body.contains("boss@example.com"));
    }

    #[tokio::test]
    async fn test_upstream_error_is_bad_gateway_with_body() {
        let response = AppError::Reporting(ReportingError::Upstream {
            status: 401,
            body: "TokenExpired".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("TokenExpired"));
    }

    #[tokio::test]
    async fn test_missing_report_is_not_found() {
        let response = AppError::ReportNotFound {
            report_id: "r9".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Report not found"));
    }

    #[tokio::test]
    async fn test_upstream_404_outside_report_lookup_is_bad_gateway() {
        let response = AppError::Reporting(ReportingError::Upstream {
            status: 404,
            body: "PowerBIEntityNotFound".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_text(response).await;
        assert!(!body.contains("Report not found"));
        assert!(body.contains("PowerBIEntityNotFound"));
    }

    #[test]
    fn test_embed_errors_map_to_their_source() {
        let err = AppError::from(EmbedError::Roles(StoreError::InvalidData("x".to_string())));
        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
