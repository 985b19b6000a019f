use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Production mode: secure cookies and a strict CORS allow-list
    #[serde(default)]
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            production: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login session in days (default: 7)
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    /// Lifetime of a password reset ticket in minutes (default: 30)
    #[serde(default = "default_reset_ttl_minutes")]
    pub reset_ttl_minutes: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Return the raw reset token in the forgot-password response.
    /// Stands in for an out-of-band delivery channel.
    #[serde(default = "default_expose_reset_token")]
    pub expose_reset_token: bool,
    #[serde(default)]
    pub argon2: Argon2Config,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_days: default_session_ttl_days(),
            reset_ttl_minutes: default_reset_ttl_minutes(),
            cookie_name: default_cookie_name(),
            expose_reset_token: default_expose_reset_token(),
            argon2: Argon2Config::default(),
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_ttl_days)
    }

    pub fn reset_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reset_ttl_minutes)
    }
}

fn default_session_ttl_days() -> i64 {
    7
}

fn default_reset_ttl_minutes() -> i64 {
    30
}

fn default_cookie_name() -> String {
    "sc_session".to_string()
}

fn default_expose_reset_token() -> bool {
    true
}

/// Argon2id cost parameters.
///
/// The defaults take roughly a quarter second per hash on commodity hardware.
#[derive(Debug, Clone, Deserialize)]
pub struct Argon2Config {
    #[serde(default = "default_argon2_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_argon2_iterations")]
    pub iterations: u32,
    #[serde(default = "default_argon2_parallelism")]
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_kib: default_argon2_memory_kib(),
            iterations: default_argon2_iterations(),
            parallelism: default_argon2_parallelism(),
        }
    }
}

fn default_argon2_memory_kib() -> u32 {
    64 * 1024
}

fn default_argon2_iterations() -> u32 {
    4
}

fn default_argon2_parallelism() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Origins accepted in production mode. Any origin is accepted otherwise.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests per window for authenticated API routes
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Requests per window for login, signup and password reset routes
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between sweeps of stale limiter entries
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Key clients by `X-Forwarded-For` / `X-Real-IP`. Only safe behind a
    /// reverse proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
            trust_proxy_headers: false,
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests() -> u32 {
    300
}

fn default_auth_requests() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings for the command-line sync client.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the superclient API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token used for authenticated requests
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Quiet period after the last local edit before a push (default: 600ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            cache_dir: default_cache_dir(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

fn default_api_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/cache")
}

fn default_debounce_ms() -> u64 {
    600
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}
