//! Configuration management for the Filemgr daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filemgr/config.toml`.
//! Environment variables override file values; the result is validated once
//! and then handed to the server by value, so nothing downstream reads the
//! environment on its own.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default route prefix the file manager endpoints are grouped under.
pub const DEFAULT_ROUTE_PREFIX: &str = "/filemanager";

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bind must be a socket address like 127.0.0.1:8080, got {0}")]
    InvalidBindAddress(String),

    #[error("route_prefix must be a non-root path of [A-Za-z0-9._~/-] characters, got {0:?}")]
    InvalidRoutePrefix(String),

    #[error("request_timeout_secs must be between 1 and 3600 seconds, got {0}")]
    InvalidRequestTimeout(u64),

    #[error("max_size must be greater than 0, got {0}")]
    InvalidMaxSize(u64),

    #[error("max_request_size ({request}) must be at least max_size ({file})")]
    InvalidMaxRequestSize { request: u64, file: u64 },

    #[error("root must not be empty")]
    EmptyRoot,

    #[error("extension {0:?} is both allowed and denied")]
    ConflictingExtension(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the Filemgr daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,

    /// File operation configuration.
    pub file: FileConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: String,

    /// Prefix the file manager routes are grouped under (`{base}`).
    pub route_prefix: String,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// File operation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Directory every operation is confined to.
    pub root: PathBuf,

    /// Maximum size of a single uploaded file in bytes (default: 100MB).
    pub max_size: u64,

    /// Maximum size of a whole request body in bytes (default: 512MB).
    pub max_request_size: u64,

    /// Extensions accepted for uploads. Empty means any extension not denied.
    pub allowed_extensions: Vec<String>,

    /// Extensions always rejected for uploads.
    pub denied_extensions: Vec<String>,

    /// Whether requests may replace existing files.
    pub allow_overwrite: bool,

    /// Stop a bulk delete at the first failure instead of continuing.
    pub bulk_stop_on_error: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            log_level: "info".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_size: 100 * 1024 * 1024,         // 100MB
            max_request_size: 512 * 1024 * 1024, // 512MB
            allowed_extensions: Vec::new(),
            denied_extensions: default_denied_extensions(),
            allow_overwrite: true,
            bulk_stop_on_error: false,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filemgr")
        .join("config.toml")
}

/// Returns the default managed root directory.
fn default_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filemgr")
        .join("files")
}

/// Extensions that a web server might execute if uploaded.
fn default_denied_extensions() -> Vec<String> {
    [
        "php", "phtml", "phar", "php3", "php4", "php5", "phps", "cgi", "pl", "exe", "sh", "bat",
        "cmd", "htaccess",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Normalize a route prefix to a leading slash and no trailing slash.
///
/// `"filemanager/"` becomes `"/filemanager"`. Empty prefixes and `/` are
/// rejected because the listing route would collide with the home route.
pub fn normalize_route_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_matches('/');
    let invalid = || ConfigError::InvalidRoutePrefix(raw.to_string());

    if trimmed.is_empty() {
        return Err(invalid());
    }

    let valid_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '/'));
    if !valid_chars {
        return Err(invalid());
    }

    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }

    Ok(format!("/{}", trimmed))
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILEMGR_ROUTE_PREFIX: Override the file manager route prefix
    /// - FILEMGR_ROOT: Override the managed root directory
    /// - FILEMGR_BIND: Override the listen address
    /// - FILEMGR_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Some(prefix) = non_empty_env("FILEMGR_ROUTE_PREFIX") {
            tracing::info!("Overriding route_prefix from environment: {}", prefix);
            self.server.route_prefix = prefix;
        }

        if let Some(root) = non_empty_env("FILEMGR_ROOT") {
            tracing::info!("Overriding root from environment: {}", root);
            self.file.root = PathBuf::from(root);
        }

        if let Some(bind) = non_empty_env("FILEMGR_BIND") {
            tracing::info!("Overriding bind from environment: {}", bind);
            self.server.bind = bind;
        }

        if let Some(level) = non_empty_env("FILEMGR_LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.server.log_level = level;
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.route_prefix()?;

        // Validate request_timeout_secs: 1-3600
        let timeout = self.server.request_timeout_secs;
        if !(1..=3600).contains(&timeout) {
            return Err(ConfigError::InvalidRequestTimeout(timeout));
        }

        if self.file.max_size == 0 {
            return Err(ConfigError::InvalidMaxSize(self.file.max_size));
        }

        if self.file.max_request_size < self.file.max_size {
            return Err(ConfigError::InvalidMaxRequestSize {
                request: self.file.max_request_size,
                file: self.file.max_size,
            });
        }

        if self.file.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        for ext in &self.file.allowed_extensions {
            let ext = normalize_extension(ext);
            if self
                .file
                .denied_extensions
                .iter()
                .any(|d| normalize_extension(d) == ext)
            {
                return Err(ConfigError::ConflictingExtension(ext));
            }
        }

        // Validate log_level is a known value
        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        Ok(())
    }

    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind.clone()))
    }

    /// Normalized route prefix, e.g. `/filemanager`.
    pub fn route_prefix(&self) -> Result<String, ConfigError> {
        normalize_route_prefix(&self.server.route_prefix)
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/filemgr/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Lowercase an extension and strip any leading dots.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "FILEMGR_ROUTE_PREFIX",
        "FILEMGR_ROOT",
        "FILEMGR_BIND",
        "FILEMGR_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.route_prefix, "/filemanager");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.file.max_size, 100 * 1024 * 1024);
        assert!(config.file.allowed_extensions.is_empty());
        assert!(config.file.denied_extensions.contains(&"php".to_string()));
        assert!(config.file.allow_overwrite);
        assert!(!config.file.bulk_stop_on_error);
        assert!(config.file.root.to_string_lossy().contains("filemgr"));
    }

    #[test]
    fn test_validate_default_config() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[server]
route_prefix = "files"

[file]
bulk_stop_on_error = true
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.route_prefix, "files");
        assert!(config.file.bulk_stop_on_error);
        // Other values should be defaults
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.file.max_size, 100 * 1024 * 1024);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[server]
bind = "0.0.0.0:9000"
route_prefix = "/admin/files"
log_level = "debug"
request_timeout_secs = 120

[file]
root = "/srv/uploads"
max_size = 1048576
max_request_size = 4194304
allowed_extensions = ["png", "jpg"]
denied_extensions = ["php"]
allow_overwrite = false
bulk_stop_on_error = true
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.route_prefix().unwrap(), "/admin/files");
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.request_timeout_secs, 120);
        assert_eq!(config.file.root, PathBuf::from("/srv/uploads"));
        assert_eq!(config.file.max_size, 1048576);
        assert_eq!(config.file.max_request_size, 4194304);
        assert_eq!(config.file.allowed_extensions, vec!["png", "jpg"]);
        assert_eq!(config.file.denied_extensions, vec!["php"]);
        assert!(!config.file.allow_overwrite);
        assert!(config.file.bulk_stop_on_error);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[server\nbind = \"x\"");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let result = Config::from_toml("[file]\nmax_size = \"big\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut original = Config::default();
        original.server.route_prefix = "/fm".to_string();
        original.file.allowed_extensions = vec!["txt".to_string()];

        let toml = original.to_toml().unwrap();
        assert!(toml.contains("[server]"));
        assert!(toml.contains("[file]"));

        let loaded = Config::from_toml(&toml).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.server.log_level = "warn".to_string();
        original.file.root = temp_dir.path().join("root");

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("filemgr"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_normalize_route_prefix() {
        assert_eq!(normalize_route_prefix("filemanager").unwrap(), "/filemanager");
        assert_eq!(normalize_route_prefix("/filemanager/").unwrap(), "/filemanager");
        assert_eq!(normalize_route_prefix(" admin/fm ").unwrap(), "/admin/fm");
    }

    #[test]
    fn test_normalize_route_prefix_rejects_root_and_junk() {
        for raw in ["", "/", "//", "a//b", "fm/../x", "fm/{id}", "f m", "*path"] {
            assert_eq!(
                normalize_route_prefix(raw),
                Err(ConfigError::InvalidRoutePrefix(raw.to_string())),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_bind_address() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBindAddress("localhost".to_string()))
        );
    }

    #[test]
    fn test_validate_request_timeout() {
        let mut config = Config::default();
        config.server.request_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRequestTimeout(0)));

        config.server.request_timeout_secs = 3601;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidRequestTimeout(3601))
        );

        config.server.request_timeout_secs = 3600;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_max_size_zero() {
        let mut config = Config::default();
        config.file.max_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxSize(0)));
    }

    #[test]
    fn test_validate_request_smaller_than_file() {
        let mut config = Config::default();
        config.file.max_size = 10;
        config.file.max_request_size = 5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxRequestSize {
                request: 5,
                file: 10
            })
        );
    }

    #[test]
    fn test_validate_empty_root() {
        let mut config = Config::default();
        config.file.root = PathBuf::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyRoot));
    }

    #[test]
    fn test_validate_conflicting_extension() {
        let mut config = Config::default();
        config.file.allowed_extensions = vec![".PHP".to_string()];
        assert_eq!(
            config.validate(),
            Err(ConfigError::ConflictingExtension("php".to_string()))
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.server.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.server.log_level = "DEBUG".to_string();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".PNG"), "png");
        assert_eq!(normalize_extension(" tar.gz "), "tar.gz");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("FILEMGR_ROUTE_PREFIX", "ci-fm");
        std::env::set_var("FILEMGR_ROOT", "/srv/files");
        std::env::set_var("FILEMGR_BIND", "0.0.0.0:80");
        std::env::set_var("FILEMGR_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.server.route_prefix, "ci-fm");
        assert_eq!(config.route_prefix().unwrap(), "/ci-fm");
        assert_eq!(config.file.root, PathBuf::from("/srv/files"));
        assert_eq!(config.server.bind, "0.0.0.0:80");
        assert_eq!(config.server.log_level, "trace");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("FILEMGR_ROUTE_PREFIX", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.route_prefix, DEFAULT_ROUTE_PREFIX);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());
    }
}
