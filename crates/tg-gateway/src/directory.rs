//! Target directory implementations

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use tg_core::error::DirectoryError;
use tg_core::traits::TargetDirectory;
use tg_core::types::{TargetId, TargetProfile};

/// Directory held in memory, mutable at runtime
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    profiles: DashMap<TargetId, TargetProfile>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the inline `[targets]` table of the config file
    pub fn from_config(targets: &HashMap<String, TargetProfile>) -> Self {
        let directory = Self::new();
        for (key, profile) in targets {
            match key.parse::<TargetId>() {
                Ok(id) => directory.insert(id, profile.clone()),
                Err(_) => tracing::warn!("Ignoring target with non-numeric id '{}'", key),
            }
        }
        directory
    }

    /// Add or replace a profile
    pub fn insert(&self, id: TargetId, profile: TargetProfile) {
        self.profiles.insert(id, profile);
    }

    pub fn remove(&self, id: TargetId) -> Option<TargetProfile> {
        self.profiles.remove(&id).map(|(_, profile)| profile)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl TargetDirectory for MemoryDirectory {
    async fn resolve(&self, target: TargetId) -> Result<Option<TargetProfile>, DirectoryError> {
        Ok(self.profiles.get(&target).map(|r| r.value().clone()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct Inventory {
    #[serde(default)]
    targets: HashMap<String, TargetProfile>,
}

/// Directory backed by a TOML inventory file.
///
/// The file is read on every lookup, so edits take effect for the next
/// session without a restart.
#[derive(Debug, Clone)]
pub struct InventoryFile {
    path: PathBuf,
}

impl InventoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TargetDirectory for InventoryFile {
    async fn resolve(&self, target: TargetId) -> Result<Option<TargetProfile>, DirectoryError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DirectoryError(format!(
                "Failed to read inventory {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let inventory: Inventory = toml::from_str(&content).map_err(|e| {
            DirectoryError(format!(
                "Invalid inventory {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(inventory.targets.get(&target.to_string()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_directory() {
        let mut targets = HashMap::new();
        targets.insert("7".to_string(), TargetProfile::new("10.0.0.7", "root", "pw"));
        targets.insert("bogus".to_string(), TargetProfile::new("x", "y", "z"));

        let directory = MemoryDirectory::from_config(&targets);
        assert_eq!(directory.len(), 1);

        let profile = directory.resolve(TargetId::new(7)).await.unwrap().unwrap();
        assert_eq!(profile.host, "10.0.0.7");
        assert!(directory.resolve(TargetId::new(8)).await.unwrap().is_none());

        directory.remove(TargetId::new(7));
        assert!(directory.resolve(TargetId::new(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inventory_file_is_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.toml");
        std::fs::write(
            &path,
            "[targets.7]\nhost = \"10.0.0.7\"\nusername = \"root\"\npassword = \"old\"\n",
        )
        .unwrap();

        let directory = InventoryFile::new(&path);
        let profile = directory.resolve(TargetId::new(7)).await.unwrap().unwrap();
        assert_eq!(profile.password, "old");
        assert_eq!(profile.port, 22);

        std::fs::write(
            &path,
            "[targets.7]\nhost = \"10.0.0.7\"\nport = 2222\nusername = \"root\"\npassword = \"new\"\n",
        )
        .unwrap();
        let profile = directory.resolve(TargetId::new(7)).await.unwrap().unwrap();
        assert_eq!(profile.password, "new");
        assert_eq!(profile.address(), "10.0.0.7:2222");

        assert!(directory.resolve(TargetId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_inventory_is_error() {
        let directory = InventoryFile::new("/nonexistent/inventory.toml");
        let err = directory.resolve(TargetId::new(7)).await.unwrap_err();
        assert!(err.0.contains("inventory"));
    }
}
