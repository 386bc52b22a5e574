use super::admin::{
    add_admin_handler, delete_mapping_handler, delete_report_access_handler,
    remove_admin_handler, save_mapping_handler, save_report_access_handler,
};
use super::handlers::{
    admin_handler, healthz_handler, index_handler, my_reports_handler, readyz_handler,
    reports_handler, view_report_handler,
};
use crate::{
    auth::{callback_handler, login_handler, login_page_handler, logout_handler},
    AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/login", get(login_page_handler))
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/logout", get(logout_handler))
        .route("/reports", get(reports_handler))
        .route("/my-reports", get(my_reports_handler))
        .route("/report/{report_id}", get(view_report_handler))
        .route("/admin", get(admin_handler))
        .route("/admin/save_mapping", post(save_mapping_handler))
        .route("/admin/delete_mapping", post(delete_mapping_handler))
        .route("/admin/save_report_access", post(save_report_access_handler))
        .route("/admin/delete_report_access", post(delete_report_access_handler))
        .route("/admin/add_admin", post(add_admin_handler))
        .route("/admin/remove_admin", post(remove_admin_handler))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}
