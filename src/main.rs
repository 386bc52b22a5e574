use anyhow::Result;
use report_portal::{
    access::bootstrap_admins, auth::helpers::create_http_client, reporting::PowerBiClient, store,
    web, AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting report portal");

    // Load configuration from environment
    let config = report_portal::config::Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        tenant_id = %config.tenant_id,
        workspace_id = %config.workspace_id,
        admin_count = config.admin_emails.len(),
        database_configured = config.database.is_some(),
        "Configuration loaded"
    );

    let cookie_key = config.cookie_key()?;

    let http_client = create_http_client(
        config.http_connect_timeout_secs,
        config.http_request_timeout_secs,
    )
    .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

    // SQL with file fallback when a database is configured, JSON files otherwise
    let store = store::open_store(&config).await;

    // Seed configured admins; the allow-list still applies if this fails
    match bootstrap_admins(store.as_ref(), &config.admin_emails).await {
        Ok(0) => {}
        Ok(added) => tracing::info!(added = added, "Bootstrapped admin users from ADMIN_EMAILS"),
        Err(e) => tracing::warn!(error = %e, "Failed to bootstrap admin users"),
    }

    let reporting = Arc::new(PowerBiClient::new(&config, http_client.clone()));

    let bind_address = config.bind_address();
    let state = AppState {
        config: Arc::new(config),
        store,
        reporting,
        http_client,
        cookie_key,
    };

    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Report portal listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
