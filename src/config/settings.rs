//! Per-store configuration sections.

use serde::Deserialize;

use super::ConfigError;

/// Default journal table name.
pub const DEFAULT_JOURNAL_TABLE: &str = "events";
/// Default snapshot table name.
pub const DEFAULT_SNAPSHOT_TABLE: &str = "snapshots";
/// Default snapshot container name.
pub const DEFAULT_SNAPSHOT_CONTAINER: &str = "snapshots";
/// Default snapshot object extension.
pub const DEFAULT_SNAPSHOT_EXTENSION: &str = crate::storage::snapshot::DEFAULT_EXTENSION;

fn default_true() -> bool {
    true
}

fn check_connections(section: &'static str, connection_strings: &[String]) -> Result<(), ConfigError> {
    if connection_strings.is_empty() {
        return Err(ConfigError::NoConnectionStrings { section });
    }
    if connection_strings.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigError::EmptyConnectionString { section });
    }
    Ok(())
}

fn check_name(section: &'static str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyName { section });
    }
    Ok(())
}

/// Journal section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    /// Table holding event rows on every shard.
    pub table_name: String,
    /// One connection string per shard, in shard order.
    pub connection_strings: Vec<String>,
    /// Create the table on every shard at startup.
    #[serde(default = "default_true")]
    pub auto_initialize: bool,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_JOURNAL_TABLE.to_string(),
            connection_strings: Vec::new(),
            auto_initialize: true,
        }
    }
}

impl JournalSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("journal", &self.table_name)?;
        check_connections("journal", &self.connection_strings)
    }
}

/// Keyed-record snapshot store section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableSnapshotSettings {
    pub table_name: String,
    pub connection_strings: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_initialize: bool,
}

impl Default for TableSnapshotSettings {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_SNAPSHOT_TABLE.to_string(),
            connection_strings: Vec::new(),
            auto_initialize: true,
        }
    }
}

impl TableSnapshotSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("table_snapshot_store", &self.table_name)?;
        check_connections("table_snapshot_store", &self.connection_strings)
    }
}

/// Object snapshot store section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObjectSnapshotSettings {
    pub container_name: String,
    pub connection_strings: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_initialize: bool,
    /// Object name extension, without the leading dot.
    pub extension: String,
}

impl Default for ObjectSnapshotSettings {
    fn default() -> Self {
        Self {
            container_name: DEFAULT_SNAPSHOT_CONTAINER.to_string(),
            connection_strings: Vec::new(),
            auto_initialize: true,
            extension: DEFAULT_SNAPSHOT_EXTENSION.to_string(),
        }
    }
}

impl ObjectSnapshotSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("object_snapshot_store", &self.container_name)?;
        check_connections("object_snapshot_store", &self.connection_strings)?;
        let extension = self.extension.trim();
        if extension.is_empty() || extension.contains('.') {
            return Err(ConfigError::InvalidExtension(self.extension.clone()));
        }
        Ok(())
    }
}
