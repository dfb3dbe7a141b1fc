//! Configuration management for the OMS server
//!
//! Loads and validates configuration from environment variables, with support
//! for different environments (development, staging, production).

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Secrets and lifetimes for the two token kinds
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Access token TTL in seconds (default: 900 = 15 minutes)
    pub access_ttl_seconds: i64,
    /// Refresh token TTL in days (default: 7)
    pub refresh_ttl_days: i64,
}

impl JwtConfig {
    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_ttl_seconds)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_ttl_days)
    }
}

/// Key namespaces and deadlines for the credential cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub access_uuid_prefix: String,
    pub refresh_uuid_prefix: String,
    pub user_prefix: String,
    /// Upper bound on a single cache round trip
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            access_uuid_prefix: "access:".to_string(),
            refresh_uuid_prefix: "refresh:".to_string(),
            user_prefix: "user:".to_string(),
            timeout: Duration::from_millis(500),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL
    pub redis_url: String,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Upper bound on a single user store query
    pub store_timeout: Duration,

    /// Upper bound on a whole login, logout, refresh or verify
    pub request_timeout: Duration,

    /// bcrypt cost used for the unknown-email comparison; should match the
    /// cost of stored password hashes
    pub password_cost: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    pub jwt: JwtConfig,

    pub cache: CacheConfig,
}

const DEV_ACCESS_SECRET: &str = "development-access-secret-change-in-production";
const DEV_REFRESH_SECRET: &str = "development-refresh-secret-change-in-production";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 5u32);
        let store_timeout = Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 2000u64));
        let request_timeout = Duration::from_millis(parse_or("REQUEST_TIMEOUT_MS", 5000u64));

        let password_cost = parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST);
        if !(4..=31).contains(&password_cost) {
            return Err(ConfigError::InvalidValue(
                "BCRYPT_COST must be between 4 and 31".to_string(),
            ));
        }

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt = JwtConfig {
            access_secret: secret_var("JWT_ACCESS_SECRET", DEV_ACCESS_SECRET, environment)?,
            refresh_secret: secret_var("JWT_REFRESH_SECRET", DEV_REFRESH_SECRET, environment)?,
            access_ttl_seconds: parse_or("JWT_ACCESS_TOKEN_TTL_SECONDS", 900i64),
            refresh_ttl_days: parse_or("JWT_REFRESH_TOKEN_TTL_DAYS", 7i64),
        };

        if jwt.access_secret == jwt.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ".to_string(),
            ));
        }
        if jwt.access_ttl_seconds <= 0 || jwt.refresh_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "token TTLs must be positive".to_string(),
            ));
        }

        let defaults = CacheConfig::default();
        let cache = CacheConfig {
            access_uuid_prefix: env::var("ACCESS_UUID_PREFIX")
                .unwrap_or(defaults.access_uuid_prefix),
            refresh_uuid_prefix: env::var("REFRESH_UUID_PREFIX")
                .unwrap_or(defaults.refresh_uuid_prefix),
            user_prefix: env::var("USER_PREFIX").unwrap_or(defaults.user_prefix),
            timeout: Duration::from_millis(parse_or("CACHE_TIMEOUT_MS", 500u64)),
        };

        if cache.access_uuid_prefix == cache.refresh_uuid_prefix
            || cache.access_uuid_prefix == cache.user_prefix
            || cache.refresh_uuid_prefix == cache.user_prefix
        {
            return Err(ConfigError::InvalidValue(
                "cache key prefixes must be distinct".to_string(),
            ));
        }

        Ok(Config {
            database_url,
            redis_url,
            environment,
            port,
            db_max_connections,
            store_timeout,
            request_timeout,
            password_cost,
            cors_allowed_origins,
            log_level,
            jwt,
            cache,
        })
    }

    /// Database URL with the password masked, for logging
    pub fn database_url_masked(&self) -> String {
        mask_url_password(&self.database_url)
    }

    /// Redis URL with the password masked, for logging
    pub fn redis_url_masked(&self) -> String {
        mask_url_password(&self.redis_url)
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Production refuses to start on the built-in development secrets.
fn secret_var(name: &str, dev_default: &str, environment: Environment) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ if environment.is_production() => Err(ConfigError::MissingEnvVar(name.to_string())),
        _ => {
            tracing::warn!(var = name, "using development signing secret");
            Ok(dev_default.to_string())
        }
    }
}

fn mask_url_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "redis://:pw@host" and "postgres://user:pw@host" both mask; a bare scheme colon does not
            if !url[colon_pos..].starts_with("://") {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
    }
    url.to_string()
}
