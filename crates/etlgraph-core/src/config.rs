//! Configuration schema (etlgraph.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listing root, relative to the working directory
pub const DEFAULT_DATA_ROOT: &str = "public/data";

/// Project crawled when none is configured
pub const DEFAULT_PROJECT: &str = "moz-fx-data-shared-prod";

/// How view references are determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyzerKind {
    /// Warehouse dry-run job, reports referenced tables without executing
    DryRun,

    /// Local SQL parsing of the view body, no warehouse round-trip
    SqlParser,
}

impl Default for AnalyzerKind {
    fn default() -> Self {
        Self::DryRun
    }
}

/// Retry policy for transient catalog failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per view, including the first (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_attempts(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-indexed) failed
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// View reference resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub analyzer: AnalyzerKind,

    /// Maximum in-flight catalog calls (1 = serial)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Record failed views with an empty reference list instead of omitting them
    #[serde(default)]
    pub record_failures: bool,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_concurrency() -> usize {
    1
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerKind::default(),
            concurrency: default_concurrency(),
            record_failures: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Catalog connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog type; the CLI connects to bigquery only
    #[serde(rename = "type")]
    pub catalog_type: String,

    /// Service account key file; Application Default Credentials when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PathBuf>,

    /// Additional catalog-specific settings
    #[serde(flatten)]
    pub settings: HashMap<String, String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_type: "bigquery".to_string(),
            credentials: None,
            settings: HashMap::new(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listing store root
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Project to crawl and to run the query-log extraction against
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Directory containing the config file (for resolving relative paths)
    #[serde(skip)]
    pub config_root: PathBuf,
}

fn default_data_root() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_ROOT)
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            project: default_project(),
            catalog: CatalogConfig::default(),
            resolver: ResolverConfig::default(),
            config_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            config.config_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Data root, resolved against the config file's directory when relative
    pub fn resolved_data_root(&self) -> PathBuf {
        if self.data_root.is_absolute() || self.config_root.as_os_str().is_empty() {
            self.data_root.clone()
        } else {
            self.config_root.join(&self.data_root)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
