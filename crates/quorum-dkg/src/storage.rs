//! Key bundle persistence.
//!
//! A bundle is written once per `(group, rotation)` after a successful run
//! and read by the workload that uses the threshold key.

use crate::config::DkgRuntimeConfig;
use async_lock::Mutex;
use async_trait::async_trait;
use quorum_core::{KeyBundle, StorageError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Storage for finished key bundles.
#[async_trait]
pub trait KeyBundleStore: Send + Sync {
    /// Persist the bundle of `group_name` for `rotation_id`
    async fn save(
        &self,
        group_name: &str,
        rotation_id: u64,
        bundle: &KeyBundle,
    ) -> Result<(), StorageError>;

    /// Read a previously saved bundle
    async fn load(&self, group_name: &str, rotation_id: u64) -> Result<KeyBundle, StorageError>;
}

/// JSON files under `<root>/schains/<group>/secret_key_<rotation>.json`.
#[derive(Debug, Clone)]
pub struct FileKeyBundleStore {
    root: PathBuf,
}

impl FileKeyBundleStore {
    /// Store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the configured node data path
    pub fn from_config(config: &DkgRuntimeConfig) -> Self {
        Self::new(config.node_data_path.clone())
    }

    /// Location of the bundle for a group and rotation
    pub fn bundle_path(&self, group_name: &str, rotation_id: u64) -> PathBuf {
        self.root
            .join("schains")
            .join(group_name)
            .join(format!("secret_key_{rotation_id}.json"))
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyBundleStore for FileKeyBundleStore {
    async fn save(
        &self,
        group_name: &str,
        rotation_id: u64,
        bundle: &KeyBundle,
    ) -> Result<(), StorageError> {
        let path = self.bundle_path(group_name, rotation_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(bundle)?;
        Self::write_atomic(&path, &data).await?;
        tracing::info!(group = %group_name, rotation_id, path = %path.display(), "key bundle saved");
        Ok(())
    }

    async fn load(&self, group_name: &str, rotation_id: u64) -> Result<KeyBundle, StorageError> {
        let path = self.bundle_path(group_name, rotation_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: path.display().to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryKeyBundleStore {
    bundles: Mutex<HashMap<(String, u64), KeyBundle>>,
}

impl MemoryKeyBundleStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bundles
    pub async fn len(&self) -> usize {
        self.bundles.lock().await.len()
    }

    /// Whether nothing was saved yet
    pub async fn is_empty(&self) -> bool {
        self.bundles.lock().await.is_empty()
    }
}

#[async_trait]
impl KeyBundleStore for MemoryKeyBundleStore {
    async fn save(
        &self,
        group_name: &str,
        rotation_id: u64,
        bundle: &KeyBundle,
    ) -> Result<(), StorageError> {
        self.bundles
            .lock()
            .await
            .insert((group_name.to_string(), rotation_id), bundle.clone());
        Ok(())
    }

    async fn load(&self, group_name: &str, rotation_id: u64) -> Result<KeyBundle, StorageError> {
        self.bundles
            .lock()
            .await
            .get(&(group_name.to_string(), rotation_id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: format!("{group_name}/{rotation_id}"),
            })
    }
}
