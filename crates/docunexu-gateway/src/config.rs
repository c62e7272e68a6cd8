use std::env;
use std::time::Duration;

use url::Url;

use crate::validation::validate_upstream_base;

const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.pdf.co/v1";
const DEFAULT_UPSTREAM_AUTH_HEADER: &str = "x-api-key";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SANDBOX_TOKEN: &str = "dn_test_sandbox";
const DEFAULT_PORT: u16 = 4080;
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_DB_PATH: &str = "./docunexu.db";
const DEFAULT_RATE_LIMIT_RPM: u32 = 600;

/// Which implementation backs the credential, balance and usage capabilities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// Embedded SQLite database at the given path.
    Sqlite { db_path: String },
    /// Hosted PostgREST-style database reached over HTTP.
    Rest { base_url: String, service_key: String },
}

#[derive(Clone)]
pub struct GatewayConfig {
    /// Base URL every proxied path is appended to
    pub upstream_base_url: String,
    /// Header name the master credential is sent in
    pub upstream_auth_header: String,
    /// Server-held master credential for the upstream API
    pub master_api_key: String,
    /// Bound on a single upstream round trip
    pub upstream_timeout: Duration,
    /// Reserved token that skips authentication and metering (None = disabled)
    pub sandbox_token: Option<String>,
    /// Server port
    pub port: u16,
    /// Limit on inbound request bodies and upstream response bodies
    pub max_body_bytes: usize,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute per client IP
    pub rate_limit_rpm: u32,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
    pub store: StoreBackend,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = match &self.store {
            StoreBackend::Sqlite { db_path } => format!("sqlite({db_path})"),
            StoreBackend::Rest { base_url, .. } => format!("rest({base_url})"),
        };
        f.debug_struct("GatewayConfig")
            .field("upstream_base_url", &self.upstream_base_url)
            .field("upstream_auth_header", &self.upstream_auth_header)
            .field("master_api_key", &"[REDACTED]")
            .field("upstream_timeout", &self.upstream_timeout)
            .field(
                "sandbox_token",
                &self.sandbox_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("port", &self.port)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("store", &store)
            .finish()
    }
}

impl GatewayConfig {
    /// Build a config with defaults for everything except the upstream and its key.
    /// Used by tests and embedders that do not read the environment.
    pub fn new(upstream_base_url: impl Into<String>, master_api_key: impl Into<String>) -> Self {
        Self {
            upstream_base_url: upstream_base_url.into(),
            upstream_auth_header: DEFAULT_UPSTREAM_AUTH_HEADER.to_string(),
            master_api_key: master_api_key.into(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            sandbox_token: Some(DEFAULT_SANDBOX_TOKEN.to_string()),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_rpm: DEFAULT_RATE_LIMIT_RPM,
            metrics_token: None,
            store: StoreBackend::Sqlite {
                db_path: DEFAULT_DB_PATH.to_string(),
            },
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Required: the master key. A missing key is a startup failure, never a per-request one.
        let master_api_key = get("PDFCO_MASTER_API_KEY")
            .ok_or(ConfigError::MissingRequired("PDFCO_MASTER_API_KEY"))?;

        let insecure_upstream = get("DOCUNEXU_INSECURE_UPSTREAM")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let upstream_base_url = get("UPSTREAM_BASE_URL")
            .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Url::parse(&upstream_base_url)
            .map_err(|_| ConfigError::InvalidUrl(upstream_base_url.clone()))?;
        if insecure_upstream {
            tracing::warn!(
                "DOCUNEXU_INSECURE_UPSTREAM=true, upstream URL checks are disabled. \
                 DO NOT use this in production!"
            );
        } else {
            validate_upstream_base(&upstream_base_url)
                .map_err(|e| ConfigError::InvalidUrl(format!("{upstream_base_url}: {e}")))?;
        }

        let upstream_auth_header = get("UPSTREAM_AUTH_HEADER")
            .unwrap_or_else(|| DEFAULT_UPSTREAM_AUTH_HEADER.to_string())
            .to_ascii_lowercase();
        if actix_web::http::header::HeaderName::from_bytes(upstream_auth_header.as_bytes()).is_err()
        {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_AUTH_HEADER",
                upstream_auth_header,
            ));
        }

        let upstream_timeout_secs = parse_or(
            "UPSTREAM_TIMEOUT_SECS",
            get("UPSTREAM_TIMEOUT_SECS"),
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?;
        if upstream_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_TIMEOUT_SECS",
                "0".to_string(),
            ));
        }

        // An explicitly empty SANDBOX_TOKEN disables the sandbox bypass.
        let sandbox_token = match lookup("SANDBOX_TOKEN") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_SANDBOX_TOKEN.to_string()),
        };

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let max_body_bytes = parse_or(
            "MAX_BODY_BYTES",
            get("MAX_BODY_BYTES"),
            DEFAULT_MAX_BODY_BYTES,
        )?;
        let rate_limit_rpm = parse_or(
            "RATE_LIMIT_RPM",
            get("RATE_LIMIT_RPM"),
            DEFAULT_RATE_LIMIT_RPM,
        )?;

        let allowed_origins: Vec<String> = get("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]);

        if allowed_origins.iter().any(|o| o == "*") && !insecure_upstream {
            tracing::error!(
                "Wildcard CORS origin '*' is not allowed in production. \
                 Specify explicit origins in ALLOWED_ORIGINS."
            );
            return Err(ConfigError::InvalidValue(
                "ALLOWED_ORIGINS",
                "*".to_string(),
            ));
        }

        let metrics_token = get("METRICS_TOKEN");
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set, /metrics endpoint is publicly accessible");
        }

        let store = match get("STORE_BACKEND").as_deref().unwrap_or("sqlite") {
            "sqlite" => StoreBackend::Sqlite {
                db_path: get("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            },
            "rest" => {
                let base_url = get("STORE_URL")
                    .ok_or(ConfigError::MissingRequired("STORE_URL"))?
                    .trim_end_matches('/')
                    .to_string();
                Url::parse(&base_url).map_err(|_| ConfigError::InvalidUrl(base_url.clone()))?;
                let service_key = get("STORE_SERVICE_KEY")
                    .ok_or(ConfigError::MissingRequired("STORE_SERVICE_KEY"))?;
                StoreBackend::Rest {
                    base_url,
                    service_key,
                }
            }
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND",
                    other.to_string(),
                ))
            }
        };

        Ok(Self {
            upstream_base_url,
            upstream_auth_header,
            master_api_key,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            sandbox_token,
            port,
            max_body_bytes,
            allowed_origins,
            rate_limit_rpm,
            metrics_token,
            store,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, v)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
