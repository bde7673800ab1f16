//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chat::ReconnectPolicy;
use crate::session::{FileStore, MemoryStore, SessionResult, SessionStore};
use crate::view::Tab;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dev_server: DevServerConfig,
}

/// REST backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    120 // XBRL conversion can be slow
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Chat socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// WebSocket origin; derived from the backend URL when unset
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Handshake deadline; a stalled handshake counts as a failed attempt
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_connect_timeout() -> u64 {
    10_000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            connect_timeout_ms: default_connect_timeout(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChatConfig {
    /// WebSocket origin to connect to
    pub fn ws_base(&self, backend: &BackendConfig) -> String {
        match &self.ws_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => backend
                .base_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

/// Client state persistence
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Keep the session id and remembered tab across runs
    #[serde(default)]
    pub persist: bool,

    /// Store file; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<String>,
}

impl SessionConfig {
    /// Open the configured client store
    pub fn open_store(&self) -> SessionResult<Arc<dyn SessionStore>> {
        if !self.persist {
            return Ok(Arc::new(MemoryStore::new()));
        }

        let path = self
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(FileStore::default_path);
        Ok(Arc::new(FileStore::open(path)?))
    }
}

/// View defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub default_tab: Tab,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Development stub server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DevServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed browser origins; empty allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl DevServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("disclosure-explorer").join("config.toml")),
            Some(PathBuf::from("./disclosure.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Backend overrides
        if let Some(url) = var("DISCLOSURE_API_URL") {
            self.backend.base_url = url;
        }
        if let Some(secs) = var("DISCLOSURE_REQUEST_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.backend.request_timeout_secs = s;
            }
        }

        // Chat overrides
        if let Some(url) = var("DISCLOSURE_WS_URL") {
            self.chat.ws_url = Some(url);
        }

        // Session overrides
        if let Some(path) = var("DISCLOSURE_SESSION_FILE") {
            self.session.persist = true;
            self.session.path = Some(path);
        }

        // Logging overrides
        if let Some(level) = var("DISCLOSURE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("DISCLOSURE_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Dev server overrides
        if let Some(host) = var("DISCLOSURE_DEV_HOST") {
            self.dev_server.host = host;
        }
        if let Some(port) = var("DISCLOSURE_DEV_PORT") {
            if let Ok(p) = port.parse() {
                self.dev_server.port = p;
            }
        }
        if let Some(origins) = var("DISCLOSURE_CORS_ORIGINS") {
            self.dev_server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Disclosure Explorer Configuration
#
# Environment variables override these settings:
# - DISCLOSURE_API_URL
# - DISCLOSURE_REQUEST_TIMEOUT_SECS
# - DISCLOSURE_WS_URL
# - DISCLOSURE_SESSION_FILE
# - DISCLOSURE_LOG_LEVEL
# - DISCLOSURE_LOG_FORMAT
# - DISCLOSURE_DEV_HOST
# - DISCLOSURE_DEV_PORT
# - DISCLOSURE_CORS_ORIGINS (comma separated)

[backend]
# Base URL of the disclosure backend REST API
base_url = "http://localhost:8000"

# Request timeout in seconds (XBRL conversion can be slow)
request_timeout_secs = 120

[chat]
# WebSocket origin; derived from backend.base_url when omitted
# ws_url = "ws://localhost:8000"

# Give up on a WebSocket handshake after this many milliseconds
connect_timeout_ms = 10000

[chat.reconnect]
# fixed: retry forever every delay_ms
# backoff: doubling delay from base_ms up to max_ms, optional max_attempts and jitter
# manual: only reconnect on request
strategy = "fixed"
delay_ms = 5000

[session]
# Keep the session id and remembered tab across runs
persist = false

# Store file (default: platform data directory)
# path = "~/.local/share/disclosure-explorer/session.json"

[view]
# Initial panel: convert, chat, about, docs
default_tab = "convert"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

[dev_server]
# Development stub backend
host = "127.0.0.1"
port = 8000

# Allowed browser origins (empty list allows any)
cors_origins = ["http://localhost:5173", "http://localhost:3000"]
"#
    .to_string()
}
