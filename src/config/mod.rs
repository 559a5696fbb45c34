//! Application configuration.
//!
//! Every section is optional: a host that only needs a journal configures
//! only `journal`. Settings are loaded from YAML files and environment
//! variables and never change after load.

mod settings;

pub use settings::{
    JournalSettings, ObjectSnapshotSettings, TableSnapshotSettings, DEFAULT_JOURNAL_TABLE,
    DEFAULT_SNAPSHOT_CONTAINER, DEFAULT_SNAPSHOT_EXTENSION, DEFAULT_SNAPSHOT_TABLE,
};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "shardjournal.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SHARDJOURNAL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SHARDJOURNAL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SHARDJOURNAL_LOG";

/// Keys parsed as comma separated lists when set from the environment.
const LIST_KEYS: [&str; 3] = [
    "journal.connection_strings",
    "table_snapshot_store.connection_strings",
    "object_snapshot_store.connection_strings",
];

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("{section}: at least one connection string is required")]
    NoConnectionStrings { section: &'static str },

    #[error("{section}: connection strings must not be empty")]
    EmptyConnectionString { section: &'static str },

    #[error("{section}: table or container name must not be empty")]
    EmptyName { section: &'static str },

    #[error("Invalid snapshot object extension: {0:?}")]
    InvalidExtension(String),
}

/// Persistence configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Event journal.
    pub journal: Option<JournalSettings>,
    /// Snapshot store keeping one table row per snapshot.
    pub table_snapshot_store: Option<TableSnapshotSettings>,
    /// Snapshot store keeping one object per snapshot.
    pub object_snapshot_store: Option<ObjectSnapshotSettings>,
}

impl PersistenceConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `shardjournal.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, for example
    ///    `SHARDJOURNAL__JOURNAL__TABLE_NAME=events`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let mut environment = Environment::with_prefix(CONFIG_ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let config: PersistenceConfig = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every configured section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(journal) = &self.journal {
            journal.validate()?;
        }
        if let Some(snapshots) = &self.table_snapshot_store {
            snapshots.validate()?;
        }
        if let Some(snapshots) = &self.object_snapshot_store {
            snapshots.validate()?;
        }
        Ok(())
    }

    /// Single in-memory shard for every store. Intended for tests.
    pub fn in_memory() -> Self {
        let memory = vec!["Backend=memory".to_string()];
        Self {
            journal: Some(JournalSettings {
                connection_strings: memory.clone(),
                ..Default::default()
            }),
            table_snapshot_store: Some(TableSnapshotSettings {
                connection_strings: memory.clone(),
                ..Default::default()
            }),
            object_snapshot_store: Some(ObjectSnapshotSettings {
                connection_strings: memory,
                ..Default::default()
            }),
        }
    }
}
