use crate::storage::image::ImageFormat;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub lock: LockConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Upper bound for the rendered card list
    #[serde(default = "default_json_buffer_size")]
    pub json_buffer_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub format: ImageFormat,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Debounce window, 0 writes every change through immediately
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub persist_check_touches: bool,
    #[serde(default = "default_process_interval_ms")]
    pub process_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    #[serde(default = "default_config_timeout_ms")]
    pub config_timeout_ms: u64,
    #[serde(default = "default_format_timeout_ms")]
    pub format_timeout_ms: u64,
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            format: ImageFormat::default(),
            capacity: default_capacity(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_cache_timeout_ms(),
            persist_check_touches: false,
            process_interval_ms: default_process_interval_ms(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
            config_timeout_ms: default_config_timeout_ms(),
            format_timeout_ms: default_format_timeout_ms(),
            render_timeout_ms: default_render_timeout_ms(),
        }
    }
}

// Default value functions
fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_json_buffer_size() -> usize {
    8192
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("rfid_cards.dat")
}

fn default_capacity() -> usize {
    crate::stores::card_table::DEFAULT_CAPACITY
}

fn default_cache_timeout_ms() -> u64 {
    crate::cache::coordinator::DEFAULT_CACHE_TIMEOUT_MS
}

fn default_process_interval_ms() -> u64 {
    1000
}

fn default_operation_timeout_ms() -> u64 {
    2000
}

fn default_config_timeout_ms() -> u64 {
    1000
}

fn default_format_timeout_ms() -> u64 {
    5000
}

fn default_render_timeout_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.port == 0 {
            bail!("Server port must be greater than 0");
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        if self.server.json_buffer_size < 16 {
            bail!("json_buffer_size must be at least 16 bytes");
        }

        // Validate storage config
        if self.storage.path.as_os_str().is_empty() {
            bail!("storage path must not be empty");
        }

        if self.storage.capacity == 0 {
            bail!("capacity must be greater than 0");
        }

        // The checksummed header stores the capacity in 16 bits
        if self.storage.capacity > usize::from(u16::MAX) {
            bail!(
                "capacity ({}) must not exceed {}",
                self.storage.capacity,
                u16::MAX
            );
        }

        // Validate cache config
        if self.cache.process_interval_ms == 0 {
            bail!("process_interval_ms must be greater than 0");
        }

        // Validate lock config
        let lock_timeouts = [
            ("operation_timeout_ms", self.lock.operation_timeout_ms),
            ("config_timeout_ms", self.lock.config_timeout_ms),
            ("format_timeout_ms", self.lock.format_timeout_ms),
            ("render_timeout_ms", self.lock.render_timeout_ms),
        ];
        for (name, value) in lock_timeouts {
            if value == 0 {
                bail!("{} must be greater than 0", name);
            }
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}
