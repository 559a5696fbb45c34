//! Connection strings and backend construction.
//!
//! Each shard is configured by one `Key=Value;` connection string:
//!
//! ```text
//! Backend=memory
//! Backend=dynamodb;Region=eu-west-1
//! Backend=dynamodb;Region=us-east-1;Endpoint=http://localhost:8000
//! Backend=s3;Region=us-east-1;Endpoint=http://localhost:9000
//! ```
//!
//! Keys are case-insensitive. Values are kept verbatim.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info};

use super::{MemoryObjectBackend, MemoryTableBackend, ObjectBackend, Result, StorageError, TableBackend};

/// Parsed `Key=Value;` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    settings: BTreeMap<String, String>,
}

impl ConnectionString {
    /// Value for `key`, matched case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Backend type, lowercased.
    pub fn backend(&self) -> Result<String> {
        self.get("backend")
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| StorageError::InvalidConnectionString("missing Backend".to_string()))
    }

    pub fn region(&self) -> Option<&str> {
        self.get("region")
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.get("endpoint")
    }

    /// Name used in logs: explicit `Name`, else endpoint, else backend type.
    pub fn display_name(&self) -> String {
        self.get("name")
            .or_else(|| self.endpoint())
            .or_else(|| self.get("backend"))
            .unwrap_or("unnamed")
            .to_string()
    }
}

impl FromStr for ConnectionString {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        let mut settings = BTreeMap::new();
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StorageError::InvalidConnectionString(format!("expected Key=Value, got {:?}", part))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(StorageError::InvalidConnectionString(format!(
                    "empty key in {:?}",
                    part
                )));
            }
            settings.insert(key.to_ascii_lowercase(), value.trim().to_string());
        }

        let parsed = Self { settings };
        parsed.backend()?;
        Ok(parsed)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.settings {
            write!(f, "{}={};", key, value)?;
        }
        Ok(())
    }
}

/// Build the table backend described by `connection`.
pub async fn connect_table_backend(connection: &str) -> Result<Arc<dyn TableBackend>> {
    let parsed: ConnectionString = connection.parse()?;
    let backend = parsed.backend()?;
    info!(backend = %backend, name = %parsed.display_name(), "Connecting table backend");

    match backend.as_str() {
        "memory" => Ok(Arc::new(MemoryTableBackend::new(parsed.display_name()))),
        #[cfg(feature = "dynamo")]
        "dynamodb" => {
            let backend = super::dynamo::DynamoTableBackend::connect(
                parsed.display_name(),
                parsed.region(),
                parsed.endpoint(),
            )
            .await;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "dynamo"))]
        "dynamodb" => {
            error!("DynamoDB table backend requested but 'dynamo' feature is not enabled");
            Err(StorageError::BackendNotEnabled("dynamodb".to_string()))
        }
        other => {
            error!("Unknown table backend: {}", other);
            Err(StorageError::InvalidConnectionString(format!(
                "unknown table backend {}",
                other
            )))
        }
    }
}

/// Build the object backend described by `connection`.
pub async fn connect_object_backend(connection: &str) -> Result<Arc<dyn ObjectBackend>> {
    let parsed: ConnectionString = connection.parse()?;
    let backend = parsed.backend()?;
    info!(backend = %backend, name = %parsed.display_name(), "Connecting object backend");

    match backend.as_str() {
        "memory" => Ok(Arc::new(MemoryObjectBackend::new(parsed.display_name()))),
        #[cfg(feature = "s3")]
        "s3" => {
            let backend = super::s3::S3ObjectBackend::connect(
                parsed.display_name(),
                parsed.region(),
                parsed.endpoint(),
            )
            .await;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "s3"))]
        "s3" => {
            error!("S3 object backend requested but 's3' feature is not enabled");
            Err(StorageError::BackendNotEnabled("s3".to_string()))
        }
        other => {
            error!("Unknown object backend: {}", other);
            Err(StorageError::InvalidConnectionString(format!(
                "unknown object backend {}",
                other
            )))
        }
    }
}
