//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (FLIGHTGATE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [flight]
//! location = "grpc://warehouse.internal:8815"
//! connect_timeout_ms = 2000
//!
//! [http]
//! port = 3001
//! cors_origins = ["http://localhost:5173"]
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! FLIGHTGATE_FLIGHT__LOCATION=127.0.0.1:9000
//! FLIGHTGATE_HTTP__PORT=8081
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::client::Location;
use crate::protocol::error::BridgeResult;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub flight: FlightConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub local_executor: LocalExecutorConfig,
}

/// Upstream Flight data service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightConfig {
    /// `host:port`, optionally with a `grpc://` or `grpc+tcp://` scheme
    #[serde(default = "default_flight_location")]
    pub location: String,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP server bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Allowed CORS origins (empty = same-origin only, unless cors_allow_all is true)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Explicitly allow all CORS origins (dev mode opt-in)
    #[serde(default)]
    pub cors_allow_all: bool,

    /// Chunks buffered between upstream and a streaming response body
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Template store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_dir")]
    pub dir: PathBuf,
}

/// Local stand-in for the data service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalExecutorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Program receiving the query on stdin
    #[serde(default)]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

// Default value functions
fn default_flight_location() -> String {
    "localhost:8815".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    3001
}
fn default_stream_buffer() -> usize {
    16
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_templates_dir() -> PathBuf {
    PathBuf::from("./templates")
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (FLIGHTGATE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("FLIGHTGATE_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FLIGHTGATE_").split("__"))
            .extract()
    }
}

impl FlightConfig {
    pub fn location(&self) -> BridgeResult<Location> {
        Location::parse(&self.location)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl LocalExecutorConfig {
    /// Enabled with a program to run
    pub fn is_active(&self) -> bool {
        self.enabled && !self.program.trim().is_empty()
    }
}

impl Default for FlightConfig {
    fn default() -> Self {
        FlightConfig {
            location: default_flight_location(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            cors_origins: Vec::new(),
            cors_allow_all: false,
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        TemplatesConfig {
            dir: default_templates_dir(),
        }
    }
}
