use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub secondary_auth: SecondaryAuthConfig,
    pub credentials: CredentialConfig,
    pub directory: DirectoryConfig,
    pub host_sdk: HostSdkConfig,
    pub routes: RouteConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Connection settings for the GoTrue-compatible auth subsystem.
#[derive(Debug, Clone)]
pub struct SecondaryAuthConfig {
    pub url: String,
    pub anon_key: Secret<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Deployment-wide key for deriving per-user secrets. Rotating it
    /// invalidates every derived secret at once.
    pub derivation_secret: Secret<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryConfig {
    pub main_admin_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HostSdkConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl HostSdkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HostSdkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    pub admin: String,
    pub dashboard: String,
    pub board_prefix: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            admin: "/admin".to_string(),
            dashboard: "/dashboard".to_string(),
            board_prefix: "/board".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

const MIN_PROD_SECRET_LEN: usize = 32;

impl BridgeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = BridgeConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("bridge-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            secondary_auth: SecondaryAuthConfig {
                url: get_env("SECONDARY_AUTH_URL", None, is_prod)?
                    .trim_end_matches('/')
                    .to_string(),
                anon_key: Secret::new(get_env("SECONDARY_AUTH_ANON_KEY", None, is_prod)?),
                request_timeout_seconds: parse_env("SECONDARY_AUTH_TIMEOUT_SECONDS", "10")?,
            },
            credentials: CredentialConfig {
                derivation_secret: Secret::new(get_env(
                    "CREDENTIAL_DERIVATION_SECRET",
                    None,
                    true,
                )?),
            },
            directory: DirectoryConfig {
                main_admin_email: get_optional_env("MAIN_ADMIN_EMAIL")
                    .map(|email| email.trim().to_lowercase())
                    .filter(|email| !email.is_empty()),
            },
            host_sdk: HostSdkConfig {
                poll_interval_ms: parse_env("HOST_SDK_POLL_INTERVAL_MS", "100")?,
                timeout_ms: parse_env("HOST_SDK_TIMEOUT_MS", "5000")?,
            },
            routes: RouteConfig {
                admin: get_env("ROUTE_ADMIN", Some("/admin"), is_prod)?,
                dashboard: get_env("ROUTE_DASHBOARD", Some("/dashboard"), is_prod)?,
                board_prefix: get_env("ROUTE_BOARD_PREFIX", Some("/board"), is_prod)?
                    .trim_end_matches('/')
                    .to_string(),
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        let secret_len = self.credentials.derivation_secret.expose_secret().len();
        if secret_len == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CREDENTIAL_DERIVATION_SECRET must not be empty"
            )));
        }

        if self.host_sdk.poll_interval_ms == 0 || self.host_sdk.timeout_ms == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HOST_SDK_POLL_INTERVAL_MS and HOST_SDK_TIMEOUT_MS must be positive"
            )));
        }

        if self.host_sdk.poll_interval_ms > self.host_sdk.timeout_ms {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HOST_SDK_POLL_INTERVAL_MS must not exceed HOST_SDK_TIMEOUT_MS"
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.environment == Environment::Prod {
            if secret_len < MIN_PROD_SECRET_LEN {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "CREDENTIAL_DERIVATION_SECRET must be at least {} bytes in production",
                    MIN_PROD_SECRET_LEN
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }

    /// Settings that are valid but worth flagging at startup. Logged by the
    /// caller once tracing is up.
    pub fn security_warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.environment == Environment::Prod && self.directory.main_admin_email.is_some() {
            warnings.push(
                "MAIN_ADMIN_EMAIL is set: any host identity asserting this email becomes super-admin",
            );
        }
        warnings
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Numeric tuning knobs keep their defaults in every environment.
fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is not valid: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
