//! Blob storage behind the handlers: get/put/list by sanitized relative key.

use crate::error::RegistryError;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
    sync::Mutex,
};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RegistryError>;
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), RegistryError>;
    async fn exists(&self, key: &str) -> Result<bool, RegistryError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistryError>;
}

/// Rejects traversal and absolute keys; returns the key as a relative path.
fn sanitize_key(key: &str) -> Option<PathBuf> {
    let trimmed = key.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let path = Path::new(trimmed);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            _ => return None,
        }
    }
    Some(clean)
}

/// Whether a client-supplied key would survive [`sanitize_key`]. Handlers
/// that derive keys from request paths check this up front so a malformed
/// key is a client error, not a storage failure.
pub fn is_valid_key(key: &str) -> bool {
    sanitize_key(key).is_some()
}

/// Filesystem-backed storage rooted at the configured data directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, RegistryError> {
        sanitize_key(key)
            .map(|rel| self.root.join(rel))
            .ok_or(RegistryError::Internal)
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RegistryError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), RegistryError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, RegistryError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel.to_string_lossy().replace('\\', "/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory storage, used by unit tests and throwaway deployments.
#[derive(Debug, Default)]
pub struct MemStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RegistryError> {
        let key = sanitize_key(key).ok_or(RegistryError::Internal)?;
        let objects = self.objects.lock().map_err(|_| RegistryError::Internal)?;
        Ok(objects.get(&key.to_string_lossy().into_owned()).cloned())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), RegistryError> {
        let key = sanitize_key(key).ok_or(RegistryError::Internal)?;
        let mut objects = self.objects.lock().map_err(|_| RegistryError::Internal)?;
        objects.insert(key.to_string_lossy().into_owned(), data.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, RegistryError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        let objects = self.objects.lock().map_err(|_| RegistryError::Internal)?;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
