//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `DOCREPO_`, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/doc-repository/{service_name}/config.toml
//! 4. System directory: /etc/doc-repository/{service_name}/config.toml
//! 5. Default values
//!
//! # Example
//!
//! ```toml
//! [service]
//! name = "notes"
//! log_level = "debug"
//!
//! [repository]
//! default_page_size = 20
//! max_page_size = 100
//! listing_mode = "aggregation"
//! ```
//!
//! `DOCREPO_REPOSITORY__DEFAULT_PAGE_SIZE=50` overrides the page size above.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::repository::ListingMode;

const APP_DIR: &str = "doc-repository";
const ENV_PREFIX: &str = "DOCREPO_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Repository defaults
    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            environment: default_environment(),
        }
    }
}

/// Defaults applied by every [`GenericRepository`](crate::repository::GenericRepository)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Return plain documents unless a call asks for typed records
    #[serde(default = "default_lean")]
    pub lean_by_default: bool,

    /// Execution-time ceiling applied when a call sets none
    #[serde(default = "default_max_time_ms")]
    pub default_max_time_ms: u64,

    /// Page size when the request carries none
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Largest page a listing may return; unlimited when unset
    #[serde(default)]
    pub max_page_size: Option<u64>,

    /// Sort applied to listings that carry none
    #[serde(default = "default_sort")]
    pub default_sort: String,

    /// Listing strategy when a call does not choose one
    #[serde(default)]
    pub listing_mode: ListingMode,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            lean_by_default: default_lean(),
            default_max_time_ms: default_max_time_ms(),
            default_page_size: default_page_size(),
            max_page_size: None,
            default_sort: default_sort(),
            listing_mode: ListingMode::default(),
        }
    }
}

impl RepositoryConfig {
    /// Default execution-time ceiling; `None` when configured as 0
    pub fn default_max_time(&self) -> Option<Duration> {
        match self.default_max_time_ms {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }
}

fn default_service_name() -> String {
    APP_DIR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_lean() -> bool {
    true
}

fn default_max_time_ms() -> u64 {
    30_000
}

fn default_page_size() -> u64 {
    crate::repository::DEFAULT_PAGE_SIZE
}

fn default_sort() -> String {
    "-createdAt".to_string()
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the running binary.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(default_service_name);

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!(service = service_name, "searching for config files");
        for path in &config_paths {
            tracing::debug!(path = %path.display(), "config candidate");
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!(path = %path.display(), "loading configuration");
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Config = figment.extract()?;
        if config.service.name == default_service_name() {
            config.service.name = service_name.to_string();
        }
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the search path; environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Candidate config files, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(APP_DIR)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }
}
