//! In-memory ObjectBackend implementation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{ObjectBackend, ObjectInfo, Result, StorageError};

struct StoredObject {
    body: Vec<u8>,
    metadata: HashMap<String, String>,
}

/// Object storage held in process memory.
pub struct MemoryObjectBackend {
    name: String,
    containers: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    fail_on_write: RwLock<bool>,
}

impl Default for MemoryObjectBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryObjectBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            containers: RwLock::new(HashMap::new()),
            fail_on_write: RwLock::new(false),
        }
    }

    /// Make every subsequent upload and delete fail with a transient error.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Names of all objects in `container`, sorted.
    pub async fn object_names(&self, container: &str) -> Vec<String> {
        self.containers
            .read()
            .await
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn has_container(&self, container: &str) -> bool {
        self.containers.read().await.contains_key(container)
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable(format!(
                "{}: injected write failure",
                self.name
            )));
        }
        Ok(())
    }

    fn missing_container(container: &str) -> StorageError {
        StorageError::MissingResource(format!("container {}", container))
    }
}

#[async_trait]
impl ObjectBackend for MemoryObjectBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool> {
        let mut containers = self.containers.write().await;
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let containers = self.containers.read().await;
        let objects = containers
            .get(container)
            .ok_or_else(|| Self::missing_container(container))?;

        Ok(objects
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, object)| ObjectInfo {
                name: name.clone(),
                metadata: object.metadata.clone(),
            })
            .collect())
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.check_write().await?;
        let mut containers = self.containers.write().await;
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| Self::missing_container(container))?;
        objects.insert(name.to_string(), StoredObject { body, metadata });
        Ok(())
    }

    async fn download(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let containers = self.containers.read().await;
        let objects = containers
            .get(container)
            .ok_or_else(|| Self::missing_container(container))?;
        Ok(objects.get(name).map(|object| object.body.clone()))
    }

    async fn delete_if_exists(&self, container: &str, name: &str) -> Result<bool> {
        self.check_write().await?;
        let mut containers = self.containers.write().await;
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| Self::missing_container(container))?;
        Ok(objects.remove(name).is_some())
    }
}
