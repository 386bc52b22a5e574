use std::env;
use std::path::PathBuf;

use axum_extra::extract::cookie::Key;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5000/auth/callback";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.microsoft.com";
pub const DEFAULT_POWERBI_API_URL: &str = "https://api.powerbi.com";

/// Minimum length of `SECRET_KEY` accepted for cookie signing
const MIN_SECRET_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

/// PostgreSQL connection settings
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
}

// Debug is implemented by hand on both structs so credentials never reach the logs
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact_url(&self.url))
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Config {
    // Environment configuration
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Identity provider (app registration)
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authority_host: String,
    pub graph_api_url: String,

    // Reporting platform
    pub workspace_id: String,
    pub powerbi_api_url: String,

    // Cookie signing secret (None = development key)
    pub secret_key: Option<String>,

    // Emails always granted the admin panel (lowercased)
    pub admin_emails: Vec<String>,

    // Storage: SQL when configured, JSON files in data_dir otherwise
    pub database: Option<DatabaseConfig>,
    pub data_dir: PathBuf,

    // HTTP client timeout configuration (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("bind_address", &self.bind_address())
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("workspace_id", &self.workspace_id)
            .field("admin_emails", &self.admin_emails)
            .field("database", &self.database)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let var = |name: &str| var(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse_or = |name: &str, default: u64| {
            var(name)
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default)
        };

        // Parse environment type
        let environment = match var("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        // Required variables, all reported at once
        let required = ["TENANT_ID", "CLIENT_ID", "CLIENT_SECRET", "WORKSPACE_ID"];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| var(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(anyhow::anyhow!(
                "Missing required environment variables: {}",
                missing.join(", ")
            ));
        }
        let required_var = |name: &str| var(name).unwrap_or_default();

        let admin_emails = var("ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        // A pool of zero connections would stall every query until the acquire timeout
        let max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(value = %raw, "Invalid DB_MAX_CONNECTIONS - using 5");
                    5
                }
            },
            None => 5,
        };

        let database = database_url(&var).map(|url| DatabaseConfig {
            url,
            max_connections,
            idle_timeout_secs: parse_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: parse_or("DB_MAX_LIFETIME_SECS", 1800),
            acquire_timeout_secs: parse_or("DB_ACQUIRE_TIMEOUT_SECS", 10),
        });

        let server_port = var("SERVER_PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(5000);

        Ok(Config {
            environment,
            server_host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
            tenant_id: required_var("TENANT_ID"),
            client_id: required_var("CLIENT_ID"),
            client_secret: required_var("CLIENT_SECRET"),
            redirect_uri: var("REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            authority_host: var("AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            graph_api_url: var("GRAPH_API_URL").unwrap_or_else(|| DEFAULT_GRAPH_API_URL.to_string()),
            workspace_id: required_var("WORKSPACE_ID"),
            powerbi_api_url: var("POWERBI_API_URL")
                .unwrap_or_else(|| DEFAULT_POWERBI_API_URL.to_string()),
            secret_key: var("SECRET_KEY"),
            admin_emails,
            database,
            data_dir: var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            http_connect_timeout_secs: parse_or("HTTP_CONNECT_TIMEOUT_SECS", 10),
            http_request_timeout_secs: parse_or("HTTP_REQUEST_TIMEOUT_SECS", 30),
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Key used to sign session cookies
    ///
    /// Derived from `SECRET_KEY`. Without one, development gets a random key
    /// (sessions end on restart) and production refuses to start.
    pub fn cookie_key(&self) -> anyhow::Result<Key> {
        match &self.secret_key {
            Some(secret) if secret.len() >= MIN_SECRET_KEY_LEN => {
                Ok(Key::derive_from(secret.as_bytes()))
            }
            Some(_) if self.is_production() => Err(anyhow::anyhow!(
                "SECRET_KEY must be at least {} bytes",
                MIN_SECRET_KEY_LEN
            )),
            None if self.is_production() => Err(anyhow::anyhow!(
                "SECRET_KEY environment variable is required in production"
            )),
            _ => {
                tracing::warn!(
                    "SECRET_KEY missing or shorter than {} bytes - using a random key, sessions will not survive restarts",
                    MIN_SECRET_KEY_LEN
                );
                Ok(Key::generate())
            }
        }
    }
}

/// `DATABASE_URL`, or a postgres URL assembled from the `DB_*` components
/// when username and password are both set
fn database_url<F>(var: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = var("DATABASE_URL") {
        return Some(url);
    }

    let username = var("DB_USERNAME")?;
    let password = var("DB_PASSWORD")?;
    let server = var("DB_SERVER").unwrap_or_else(|| "localhost".to_string());
    let port = var("DB_PORT").unwrap_or_else(|| "5432".to_string());
    let name = var("DB_NAME").unwrap_or_else(|| "portal".to_string());

    Some(format!(
        "postgres://{}:{}@{}:{}/{}",
        urlencoding::encode(&username),
        urlencoding::encode(&password),
        server,
        port,
        urlencoding::encode(&name)
    ))
}

/// Strip the password from a connection URL
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            // set_password only fails for cannot-be-a-base URLs, which have no password
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable>".to_string(),
    }
}
