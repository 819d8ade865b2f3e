use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AdsError, Result};
use crate::models::AccountId;

pub const ENV_DEVELOPER_TOKEN: &str = "GOOGLE_ADS_DEVELOPER_TOKEN";
pub const ENV_LOGIN_CUSTOMER_ID: &str = "GOOGLE_ADS_LOGIN_CUSTOMER_ID";
pub const ENV_CLIENT_ID: &str = "GOOGLE_ADS_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_ADS_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "GOOGLE_ADS_REFRESH_TOKEN";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_ADS_ACCESS_TOKEN";
pub const ENV_USE_PROTO_PLUS: &str = "GOOGLE_ADS_USE_PROTO_PLUS";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Secrets never come from the config file
    #[serde(skip)]
    pub credentials: AdsCredentials,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Google Ads API credentials
#[derive(Clone, Default)]
pub struct AdsCredentials {
    pub developer_token: String,
    /// Manager account sent as `login-customer-id`; also the default walk root
    pub login_customer_id: Option<AccountId>,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Pre-supplied access token, used until it is due for refresh
    pub access_token: Option<String>,
    /// Carried for parity with the client library config; has no effect on values
    pub use_proto_plus: bool,
}

impl fmt::Debug for AdsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &str) -> &'static str {
            if value.is_empty() {
                "<missing>"
            } else {
                "<redacted>"
            }
        }

        f.debug_struct("AdsCredentials")
            .field("developer_token", &redact(&self.developer_token))
            .field("login_customer_id", &self.login_customer_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("access_token", &self.access_token.as_deref().map(redact))
            .field("use_proto_plus", &self.use_proto_plus)
            .finish()
    }
}

impl AdsCredentials {
    /// Read credentials from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build credentials from any key lookup and validate them
    ///
    /// Empty values count as missing. Fails with `AuthError` naming every
    /// missing variable so nothing touches the network with half a config.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let login_customer_id = get(ENV_LOGIN_CUSTOMER_ID)
            .map(|raw| raw.parse::<AccountId>())
            .transpose()?;

        let credentials = Self {
            developer_token: get(ENV_DEVELOPER_TOKEN).unwrap_or_default(),
            login_customer_id,
            client_id: get(ENV_CLIENT_ID).unwrap_or_default(),
            client_secret: get(ENV_CLIENT_SECRET).unwrap_or_default(),
            refresh_token: get(ENV_REFRESH_TOKEN).unwrap_or_default(),
            access_token: get(ENV_ACCESS_TOKEN),
            use_proto_plus: get(ENV_USE_PROTO_PLUS)
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        };

        credentials.validate()?;
        Ok(credentials)
    }

    /// Names of the required variables that are not set
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.developer_token.is_empty() {
            missing.push(ENV_DEVELOPER_TOKEN);
        }
        if self.client_id.is_empty() {
            missing.push(ENV_CLIENT_ID);
        }
        if self.client_secret.is_empty() {
            missing.push(ENV_CLIENT_SECRET);
        }
        if self.refresh_token.is_empty() {
            missing.push(ENV_REFRESH_TOKEN);
        }
        if self.login_customer_id.is_none() {
            missing.push(ENV_LOGIN_CUSTOMER_ID);
        }
        missing
    }

    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AdsError::AuthError(format!(
                "Missing required Google Ads credentials: {}",
                missing.join(", ")
            )))
        }
    }

    /// Login customer id, or `AuthError` if it was never configured
    pub fn login_customer(&self) -> Result<AccountId> {
        self.login_customer_id.ok_or_else(|| {
            AdsError::AuthError(format!("{} is not set", ENV_LOGIN_CUSTOMER_ID))
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_version")]
    pub version: String,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            version: default_api_version(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    /// Managers deeper than this are not expanded
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default = "default_skip_inactive")]
    pub skip_inactive_accounts: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            max_depth: None,
            skip_inactive_accounts: default_skip_inactive(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_output_prefix")]
    pub prefix: String,
    /// Where records are dumped when the primary write fails
    #[serde(default)]
    pub fallback_directory: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            prefix: default_output_prefix(),
            fallback_directory: None,
        }
    }
}

impl OutputConfig {
    pub fn fallback_directory(&self) -> PathBuf {
        self.fallback_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn default_endpoint() -> String {
    "https://googleads.googleapis.com".to_string()
}

fn default_api_version() -> String {
    "v20".to_string()
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_concurrent_queries() -> usize {
    8
}

fn default_skip_inactive() -> bool {
    true
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_prefix() -> String {
    "clicks".to_string()
}

impl Config {
    /// Load tuning settings from a TOML file; credentials are filled separately
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AdsError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AdsError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn with_credentials(mut self, credentials: AdsCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.api.endpoint.starts_with("https://") || self.api.endpoint.starts_with("http://")) {
            return Err(AdsError::ConfigError(format!(
                "api.endpoint must be an http(s) URL, got '{}'",
                self.api.endpoint
            )));
        }

        if self.api.version.is_empty() {
            return Err(AdsError::ConfigError(
                "api.version cannot be empty".to_string(),
            ));
        }

        if self.api.max_concurrent_requests == 0 || self.api.max_concurrent_requests > 50 {
            return Err(AdsError::ConfigError(
                "api.max_concurrent_requests must be between 1 and 50".to_string(),
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(AdsError::ConfigError(
                "api.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.run.max_concurrent_queries == 0 || self.run.max_concurrent_queries > 50 {
            return Err(AdsError::ConfigError(
                "run.max_concurrent_queries must be between 1 and 50".to_string(),
            ));
        }

        if self.output.prefix.is_empty() {
            return Err(AdsError::ConfigError(
                "output.prefix cannot be empty".to_string(),
            ));
        }
        if self.output.prefix.contains('/') || self.output.prefix.contains('\\') {
            return Err(AdsError::ConfigError(
                "output.prefix cannot contain path separators".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
