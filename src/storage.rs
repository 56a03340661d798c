//! Defines the blob storage seam used by the ingestion step and the
//! dashboard processors.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Named binary objects grouped in containers. A container is a
/// bucket for S3-backed storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Deletes a single blob. Fails if it can't be deleted.
    async fn delete_blob(&self, container: &str, name: &str) -> Result<()>;

    /// Reads a single blob, or `None` if it doesn't exist.
    async fn get_blob(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a single blob, replacing any previous content.
    async fn put_blob(&self, container: &str, name: &str, content: Vec<u8>) -> Result<()>;
}

/// An in-process blob store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists the names held in a container, in lexicographic order.
    pub async fn names(&self, container: &str) -> Vec<String> {
        self.blobs
            .lock()
            .await
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn delete_blob(&self, container: &str, name: &str) -> Result<()> {
        self.blobs
            .lock()
            .await
            .remove(&(container.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| anyhow!("blob {:?} not found in container {:?}", name, container))
    }

    async fn get_blob(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .lock()
            .await
            .get(&(container.to_string(), name.to_string()))
            .cloned())
    }

    async fn put_blob(&self, container: &str, name: &str, content: Vec<u8>) -> Result<()> {
        self.blobs
            .lock()
            .await
            .insert((container.to_string(), name.to_string()), content);
        Ok(())
    }
}
