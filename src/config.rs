//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! All configuration is loaded at startup and validated before the application runs.

use std::env;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use crate::constants::{
    sandbox_backends, DEFAULT_COMPILE_TIMEOUT_SECONDS, DEFAULT_DATABASE_MAX_CONNECTIONS,
    DEFAULT_LOG_FILTER, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT, DEFAULT_TEST_TIMEOUT_SECONDS,
};

/// Global application configuration (lazily initialized)
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::from_env().expect("Failed to load configuration from environment")
});

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub sandbox: SandboxConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Redis configuration. Rate limiting is disabled without a URL.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
}

/// JWT authentication configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
}

/// Execution sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Which backend executes submissions (`docker` or `process`)
    pub backend: String,
    pub docker_socket: String,
    pub network_name: String,
    /// Upper bound for the compilation step
    pub compile_timeout: Duration,
    /// Fallback per-test bound when neither test nor assignment set one
    pub default_test_timeout: Duration,
    /// Bytes kept per captured output stream
    pub output_limit_bytes: usize,
    pub memory_limit_mb: u64,
    /// Parent directory for process-backend working directories
    pub work_root: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| DEFAULT_DATABASE_MAX_CONNECTIONS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS".to_string()))?,
        })
    }
}

impl RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
        })
    }
}

impl JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: env::var("JWT_SECRET")
                .map_err(|_| ConfigError::Missing("JWT_SECRET".to_string()))?,
        })
    }
}

impl SandboxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend =
            env::var("SANDBOX_BACKEND").unwrap_or_else(|_| sandbox_backends::DOCKER.to_string());
        if !sandbox_backends::ALL.contains(&backend.as_str()) {
            return Err(ConfigError::InvalidValue("SANDBOX_BACKEND".to_string()));
        }

        Ok(Self {
            backend,
            docker_socket: env::var("DOCKER_SOCKET")
                .unwrap_or_else(|_| "/var/run/docker.sock".to_string()),
            network_name: env::var("SANDBOX_NETWORK").unwrap_or_else(|_| "none".to_string()),
            compile_timeout: parse_seconds(
                "COMPILE_TIMEOUT_SECONDS",
                DEFAULT_COMPILE_TIMEOUT_SECONDS,
            )?,
            default_test_timeout: parse_seconds(
                "DEFAULT_TEST_TIMEOUT_SECONDS",
                DEFAULT_TEST_TIMEOUT_SECONDS,
            )?,
            output_limit_bytes: env::var("OUTPUT_LIMIT_BYTES")
                .unwrap_or_else(|_| DEFAULT_OUTPUT_LIMIT_BYTES.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("OUTPUT_LIMIT_BYTES".to_string()))?,
            memory_limit_mb: env::var("SANDBOX_MEMORY_LIMIT_MB")
                .unwrap_or_else(|_| DEFAULT_MEMORY_LIMIT_MB.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SANDBOX_MEMORY_LIMIT_MB".to_string()))?,
            work_root: env::var("SANDBOX_WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
        })
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: sandbox_backends::PROCESS.to_string(),
            docker_socket: "/var/run/docker.sock".to_string(),
            network_name: "none".to_string(),
            compile_timeout: Duration::from_secs_f64(DEFAULT_COMPILE_TIMEOUT_SECONDS),
            default_test_timeout: Duration::from_secs_f64(DEFAULT_TEST_TIMEOUT_SECONDS),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            work_root: env::temp_dir(),
        }
    }
}

/// Parse a positive number of seconds from the environment
fn parse_seconds(name: &str, default: f64) -> Result<Duration, ConfigError> {
    let seconds: f64 = match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string()))?,
        Err(_) => default,
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::InvalidValue(name.to_string()));
    }

    Ok(Duration::from_secs_f64(seconds))
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
