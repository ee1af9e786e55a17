//! Server configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. stock defaults ([`ServerConfig::default`]),
//! 2. an optional TOML file passed with `--config`,
//! 3. command-line flags.
//!
//! The merged result is validated once at startup and then passed by
//! reference to everything that needs it.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! listen = ":8080"           # ":port" binds every interface
//! source_dir = "upload"      # Root directory of source images
//! cache_size = 134217728     # In-memory cache budget in bytes (0 = off)
//! max_width = 2048           # Output width cap in pixels
//! max_height = 2048          # Output height cap in pixels
//! # concurrency = 8          # Simultaneous pipelines (omit for 2 x cores)
//! expires_secs = 604800      # Expires header offset (7 days)
//! gamma_correction = true    # Resample in linear light
//! quality = 90               # Default JPEG quality (1-100)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration. See the [module docs](self) for every key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address, `host:port` or `:port`.
    pub listen: String,
    /// Root directory that source paths are resolved against.
    pub source_dir: PathBuf,
    /// Byte budget of the in-memory cache. `0` disables caching.
    pub cache_size: u64,
    pub max_width: u32,
    pub max_height: u32,
    /// Maximum number of pipelines running at once.
    /// When absent, defaults to twice the number of CPU cores.
    pub concurrency: Option<usize>,
    /// Seconds added to the current time for the `Expires` header.
    pub expires_secs: u64,
    /// Process in linear light unless a request says otherwise.
    pub gamma_correction: bool,
    /// JPEG quality used when the request gives none.
    pub quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ":8080".to_string(),
            source_dir: PathBuf::from("upload"),
            cache_size: 128 * 1024 * 1024,
            max_width: 2048,
            max_height: 2048,
            concurrency: None,
            expires_secs: 7 * 24 * 60 * 60,
            gamma_correction: true,
            quality: 90,
        }
    }
}

impl ServerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ConfigError::Validation(
                "max_width and max_height must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::Validation("quality must be 1-100".into()));
        }
        if self.expires_secs == 0 {
            return Err(ConfigError::Validation(
                "expires_secs must be positive".into(),
            ));
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::Validation(
                "concurrency must be at least 1".into(),
            ));
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Address in a form `TcpListener::bind` accepts. A bare `:port` binds
    /// every interface.
    pub fn listen_addr(&self) -> Result<String, ConfigError> {
        let addr = if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        };
        let valid = addr
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(ConfigError::Validation(format!(
                "listen address '{}' must be host:port or :port",
                self.listen
            )));
        }
        Ok(addr)
    }

    /// Resolve the effective pipeline concurrency.
    ///
    /// - `None` → twice the available cores
    /// - `Some(n)` → `n`
    pub fn effective_concurrency(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.concurrency.unwrap_or(cores * 2)
    }
}

/// Load a config file. Keys it leaves out keep their defaults.
///
/// Not validated here: CLI overrides still have to be applied.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgserve Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Command-line flags override them.
# Unknown keys will cause an error.

# Address to listen on. ":port" binds every interface.
listen = ":8080"

# Directory holding the source images. Request paths are resolved inside it
# and can never leave it.
source_dir = "upload"

# In-memory cache budget in bytes, counted over encoded output sizes.
# Least recently used entries are evicted first. 0 disables the cache.
cache_size = 134217728

# Output size caps in pixels. Larger requests are scaled down to fit,
# never rejected.
max_width = 2048
max_height = 2048

# Maximum number of images processed at the same time. Further requests
# wait for a slot. Omit for twice the number of CPU cores.
# concurrency = 8

# Seconds from now stamped into the Expires response header (7 days).
expires_secs = 604800

# Resample and rotate in linear light. Requests can override this with
# gamma=true or gamma=false.
gamma_correction = true

# JPEG quality when the request does not set one (1 = worst, 100 = best).
quality = 90
"##
}
