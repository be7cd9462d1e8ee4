//! Configuration loading and typed config structures for the Oravia kernel.
//!
//! The canonical configuration lives in `oravia-config.yaml` at the project
//! root. Every section and field has a default, so an empty file describes
//! the live world: speed 10, a 15x15 map, and an in-memory store.

use std::path::Path;

use oravia_types::{BuildingLevels, BuildingType, Resources};
use oravia_world::{WorldError, WorldRules};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an unusable kernel.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl From<WorldError> for ConfigError {
    fn from(err: WorldError) -> Self {
        Self::Invalid {
            reason: err.to_string(),
        }
    }
}

/// Top-level kernel configuration.
///
/// Mirrors the structure of `oravia-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KernelConfig {
    /// Formula constants and stat tables.
    #[serde(default)]
    pub rules: WorldRules,

    /// Map and new-village settings.
    #[serde(default)]
    pub world: WorldConfig,

    /// Per-village limits.
    #[serde(default)]
    pub village: VillageConfig,

    /// Command scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Store backend settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KernelConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `DRAGONFLY_URL` overrides `store.dragonfly_url` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.store.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules.validate()?;
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_owned(),
            })
        };
        if self.world.map_size <= 0 {
            return invalid("world.map_size must be positive");
        }
        if self.village.max_build_queue == 0 {
            return invalid("village.max_build_queue must be at least 1");
        }
        if self.scheduler.max_concurrent_commands == 0 {
            return invalid("scheduler.max_concurrent_commands must be at least 1");
        }
        if self.scheduler.lease_ttl_ms <= self.scheduler.poll_interval_ms {
            return invalid("scheduler.lease_ttl_ms must exceed scheduler.poll_interval_ms");
        }
        if self.store.max_transaction_attempts == 0 {
            return invalid("store.max_transaction_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Map and new-village configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Side length of the square map; tiles run from 0 to `map_size - 1`.
    #[serde(default = "default_map_size")]
    pub map_size: i32,

    /// Random tiles tried before founding a village gives up.
    #[serde(default = "default_found_attempts")]
    pub found_attempts: u32,

    /// State of a freshly founded village.
    #[serde(default)]
    pub starting_village: StartingVillageConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_size: default_map_size(),
            found_attempts: default_found_attempts(),
            starting_village: StartingVillageConfig::default(),
        }
    }
}

/// State of a freshly founded village.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartingVillageConfig {
    /// Initial stockpile.
    #[serde(default = "default_starting_resources")]
    pub resources: Resources,

    /// Initial building levels. Missing buildings start at 0.
    #[serde(default = "default_starting_buildings")]
    pub buildings: BuildingLevels,

    /// Initial score.
    #[serde(default = "default_starting_points")]
    pub points: u64,
}

impl Default for StartingVillageConfig {
    fn default() -> Self {
        Self {
            resources: default_starting_resources(),
            buildings: default_starting_buildings(),
            points: default_starting_points(),
        }
    }
}

/// Per-village limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VillageConfig {
    /// Construction orders a village may have waiting at once.
    #[serde(default = "default_max_build_queue")]
    pub max_build_queue: usize,
}

impl Default for VillageConfig {
    fn default() -> Self {
        Self {
            max_build_queue: default_max_build_queue(),
        }
    }
}

/// Command scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Due commands processed in parallel within one tick.
    #[serde(default = "default_max_concurrent_commands")]
    pub max_concurrent_commands: usize,

    /// Lifetime of the scheduler lease, in milliseconds.
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,

    /// Age after which settlement journal entries are dropped, in milliseconds.
    #[serde(default = "default_settlement_retention_ms")]
    pub settlement_retention_ms: u64,

    /// Name this process uses when holding the lease. Random when unset.
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_commands: default_max_concurrent_commands(),
            lease_ttl_ms: default_lease_ttl_ms(),
            settlement_retention_ms: default_settlement_retention_ms(),
            instance_id: None,
        }
    }
}

/// Which store implementation the engine runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process map; state is lost on exit.
    #[default]
    Memory,
    /// Shared `Dragonfly` instance.
    Dragonfly,
}

/// Store backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// Attempts an optimistic transaction makes before reporting a conflict.
    #[serde(default = "default_max_transaction_attempts")]
    pub max_transaction_attempts: u32,
}

impl StoreConfig {
    /// Override the Dragonfly URL with `DRAGONFLY_URL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            dragonfly_url: default_dragonfly_url(),
            max_transaction_attempts: default_max_transaction_attempts(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_map_size() -> i32 {
    15
}

const fn default_found_attempts() -> u32 {
    64
}

const fn default_starting_resources() -> Resources {
    Resources::new(500, 500, 500)
}

fn default_starting_buildings() -> BuildingLevels {
    BuildingType::ALL
        .iter()
        .map(|&building| (building, u32::from(building != BuildingType::Wall)))
        .collect()
}

const fn default_starting_points() -> u64 {
    50
}

const fn default_max_build_queue() -> usize {
    5
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_max_concurrent_commands() -> usize {
    16
}

const fn default_lease_ttl_ms() -> u64 {
    10_000
}

const fn default_settlement_retention_ms() -> u64 {
    86_400_000
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_max_transaction_attempts() -> u32 {
    16
}

fn default_log_level() -> String {
    "info".to_owned()
}
