use std::time::{Duration, Instant};

use async_trait::async_trait;
use oauth2::{basic::BasicClient, AuthType, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::RwLock;

use super::{EmbedToken, EmbedTokenRequest, Report, ReportingApi, ReportingError};
use crate::auth::helpers::build_authority_url;
use crate::config::Config;

/// Scope granting the service principal access to the reporting REST API
pub const REPORTING_API_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

/// Refresh the service-principal token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DatasetRole {
    name: String,
}

struct CachedToken {
    secret: String,
    expires_at: Instant,
}

/// Power BI REST client acting as the application's service principal
pub struct PowerBiClient {
    http: reqwest::Client,
    api_base_url: String,
    workspace_id: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token_cache: RwLock<Option<CachedToken>>,
}

impl PowerBiClient {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        // Normalize URLs by trimming trailing slashes to prevent double-slash issues
        let api_base_url = config.powerbi_api_url.trim_end_matches('/').to_string();
        let token_url = build_authority_url(&config.authority_host, &config.tenant_id, "token");

        tracing::info!(
            api_base_url = %api_base_url,
            workspace_id = %config.workspace_id,
            "Reporting client initialized"
        );

        Self {
            http,
            api_base_url,
            workspace_id: config.workspace_id.clone(),
            token_url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_cache: RwLock::new(None),
        }
    }

    fn workspace_url(&self, path: &str) -> String {
        format!(
            "{}/v1.0/myorg/groups/{}/{}",
            self.api_base_url,
            urlencoding::encode(&self.workspace_id),
            path
        )
    }

    /// Service-principal access token, reused until shortly before it expires
    async fn access_token(&self) -> Result<String, ReportingError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if Instant::now() + TOKEN_REFRESH_MARGIN < cached.expires_at {
                    return Ok(cached.secret.clone());
                }
            }
        } // Lock is dropped here

        self.refresh_token().await
    }

    /// Acquire a new token with the client-credentials grant
    async fn refresh_token(&self) -> Result<String, ReportingError> {
        let token_url = TokenUrl::new(self.token_url.clone())
            .map_err(|e| ReportingError::InvalidUrl(format!("{}: {}", self.token_url, e)))?;

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        tracing::debug!("Requesting service principal token for reporting API");

        let response = client
            .exchange_client_credentials()
            .add_scope(Scope::new(REPORTING_API_SCOPE.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Service principal token request failed");
                ReportingError::Auth(e.to_string())
            })?;

        let secret = response.access_token().secret().clone();
        let lifetime = response.expires_in().unwrap_or(Duration::from_secs(3600));

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            secret: secret.clone(),
            expires_at: Instant::now() + lifetime,
        });

        tracing::info!(expires_in_secs = lifetime.as_secs(), "Reporting API token acquired");
        Ok(secret)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ReportingError> {
        let token = self.access_token().await?;
        let response = self.http.get(url).bearer_auth(&token).send().await?;
        decode_response(response).await
    }
}

/// Turn a non-success response into `ReportingError::Upstream` carrying the body
async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ReportingError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ReportingError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json().await?)
}

#[async_trait]
impl ReportingApi for PowerBiClient {
    async fn list_reports(&self) -> Result<Vec<Report>, ReportingError> {
        let list: ValueList<Report> = self.get_json(&self.workspace_url("reports")).await?;
        tracing::debug!(count = list.value.len(), "Listed workspace reports");
        Ok(list.value)
    }

    async fn get_report(&self, report_id: &str) -> Result<Report, ReportingError> {
        let path = format!("reports/{}", urlencoding::encode(report_id));
        self.get_json(&self.workspace_url(&path)).await
    }

    async fn list_dataset_roles(&self, dataset_id: &str) -> Result<Vec<String>, ReportingError> {
        let path = format!("datasets/{}/roles", urlencoding::encode(dataset_id));
        let list: ValueList<DatasetRole> = self.get_json(&self.workspace_url(&path)).await?;
        Ok(list.value.into_iter().map(|role| role.name).collect())
    }

    async fn generate_embed_token(
        &self,
        request: &EmbedTokenRequest,
    ) -> Result<EmbedToken, ReportingError> {
        let token = self.access_token().await?;
        let url = format!("{}/v1.0/myorg/GenerateToken", self.api_base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(request)
            .send()
            .await?;

        decode_response(response).await
    }
}
