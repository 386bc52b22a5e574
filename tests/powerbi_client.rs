use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use report_portal::auth::helpers::create_http_client;
use report_portal::auth::identity::fetch_profile;
use report_portal::config::Config;
use report_portal::reporting::{
    negotiate_embed_token, EmbedMode, PowerBiClient, ReportingApi, ReportingError,
};
use report_portal::store::{upsert_role_mapping, FileStore};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

const SP_TOKEN: &str = "sp-token";

#[derive(Clone, Default)]
struct MockState {
    token_calls: Arc<AtomicUsize>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", SP_TOKEN))
        .unwrap_or(false)
}

async fn token(State(state): State<MockState>) -> impl IntoResponse {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "access_token": SP_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    }))
}

async fn reports(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "TokenExpired"})));
    }
    (
        StatusCode::OK,
        Json(json!({"value": [{
            "id": "r1",
            "name": "Sales",
            "datasetId": "ds-1",
            "embedUrl": "https://app.powerbi.com/reportEmbed?reportId=r1",
            "webUrl": "https://app.powerbi.com/groups/ws-1/reports/r1"
        }]})),
    )
}

async fn dataset_roles() -> impl IntoResponse {
    Json(json!({"value": [{"name": "Customer", "modelPermission": "Read"}]}))
}

/// Mimics a dataset with row-level security: identity required
async fn generate_token(Json(body): Json<Value>) -> impl IntoResponse {
    let has_identity = body
        .get("identities")
        .and_then(|v| v.as_array())
        .map(|a| !a.is_empty())
        .unwrap_or(false);

    if !has_identity {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {
                "code": "InvalidRequest",
                "message": "Creating embed token for accessing dataset ds-1 requires effective identity to be provided"
            }})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "token": format!("embed-for-{}", body["identities"][0]["username"].as_str().unwrap_or("")),
            "tokenId": "t-1",
            "expiration": "2030-01-01T00:00:00Z"
        })),
    )
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    if headers.get("authorization").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "displayName": "Alice",
            "userPrincipalName": "alice@corp.com"
        })),
    )
}

async fn start_mock_platform() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/tenant-1/oauth2/v2.0/token", post(token))
        .route("/v1.0/myorg/groups/ws-1/reports", get(reports))
        .route("/v1.0/myorg/groups/ws-1/datasets/ds-1/roles", get(dataset_roles))
        .route("/v1.0/myorg/GenerateToken", post(generate_token))
        .route("/v1.0/me", get(me))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock server");
    let addr = listener.local_addr().expect("no local address");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{}", addr), state)
}

fn config_for(base_url: &str) -> Config {
    let base_url = base_url.to_string();
    Config::from_vars(move |name| match name {
        "TENANT_ID" => Some("tenant-1".to_string()),
        "CLIENT_ID" => Some("client-1".to_string()),
        "CLIENT_SECRET" => Some("secret".to_string()),
        "WORKSPACE_ID" => Some("ws-1".to_string()),
        "AUTHORITY_HOST" | "POWERBI_API_URL" | "GRAPH_API_URL" => Some(base_url.clone()),
        _ => None,
    })
    .expect("valid test config")
}

fn http_client() -> reqwest::Client {
    create_http_client(5, 10).expect("failed to build HTTP client")
}

#[tokio::test]
async fn test_client_lists_reports_and_reuses_token() {
    let (base_url, mock) = start_mock_platform().await;
    let client = PowerBiClient::new(&config_for(&base_url), http_client());

    let reports = client.list_reports().await.expect("list reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].dataset_id, "ds-1");

    let roles = client.list_dataset_roles("ds-1").await.expect("list roles");
    assert_eq!(roles, vec!["Customer".to_string()]);

    // Second and third calls reuse the cached service-principal token
    assert_eq!(mock.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_surfaces_upstream_status() {
    let (base_url, _mock) = start_mock_platform().await;
    let client = PowerBiClient::new(&config_for(&base_url), http_client());

    let err = client.get_report("missing").await.unwrap_err();
    assert!(matches!(err, ReportingError::Upstream { status: 404, .. }));
}

#[tokio::test]
async fn test_negotiation_against_restricted_dataset() {
    let (base_url, _mock) = start_mock_platform().await;
    let client = PowerBiClient::new(&config_for(&base_url), http_client());

    let temp_dir = TempDir::new().expect("failed to create temp directory");
    let store = FileStore::new(temp_dir.path());
    upsert_role_mapping(&store, "alice@corp.com", "ds-1", vec!["Manager".to_string()], "admin")
        .await
        .expect("save mapping");

    let session = negotiate_embed_token(&client, &store, "r1", "ds-1", "alice@corp.com")
        .await
        .expect("embed token");

    assert_eq!(session.mode, EmbedMode::Filtered);
    assert_eq!(session.token.token, "embed-for-alice@corp.com");
    assert!(session.roles.contains("Manager"));
}

#[tokio::test]
async fn test_fetch_profile_from_graph() {
    let (base_url, _mock) = start_mock_platform().await;

    let user = fetch_profile(&http_client(), &base_url, "user-token")
        .await
        .expect("profile");
    assert_eq!(user.name, "Alice");
    assert_eq!(user.email, "alice@corp.com");
}
