use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::{BotvisorError, BotvisorResult};

use super::Registry;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Durable storage for the registry.
///
/// Implementations always read and write the whole registry; there are no partial updates.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Loads the registry, bootstrapping an empty one if none exists yet.
    async fn load(&self) -> BotvisorResult<Registry>;

    /// Replaces the stored registry with `registry`.
    async fn save(&self, registry: &Registry) -> BotvisorResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A registry kept in a single pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl JsonFileStore {
    /// Creates a store backed by the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> BotvisorResult<Registry> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "no registry found at {}, creating an empty one",
                    self.path.display()
                );
                let registry = Registry::new();
                self.save(&registry).await?;
                return Ok(registry);
            }
            Err(e) => return Err(BotvisorError::registry_io(&self.path, e)),
        };

        let registry: Registry = serde_json::from_str(&content)
            .map_err(|e| BotvisorError::registry_io(&self.path, e.into()))?;

        tracing::debug!(
            "loaded {} units from {}",
            registry.len(),
            self.path.display()
        );

        Ok(registry)
    }

    async fn save(&self, registry: &Registry) -> BotvisorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BotvisorError::registry_io(&self.path, e))?;
        }

        let content = serde_json::to_string_pretty(registry)
            .map_err(|e| BotvisorError::registry_io(&self.path, e.into()))?;

        // Write a sibling file, then rename it over the document.
        let temp_path = self.temp_path();
        fs::write(&temp_path, content)
            .await
            .map_err(|e| BotvisorError::registry_io(&self.path, e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| BotvisorError::registry_io(&self.path, e))?;

        tracing::debug!("saved {} units to {}", registry.len(), self.path.display());

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{UnitRecord, UnitStatus};
    use tempfile::TempDir;

    #[test_log::test(tokio::test)]
    async fn test_load_bootstraps_missing_document() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("state").join("managed_bots.json");
        let store = JsonFileStore::new(&path);

        let registry = store.load().await?;

        assert!(registry.is_empty());
        assert_eq!(fs::read_to_string(&path).await?.trim(), "{}");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_load_rejects_malformed_document() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("managed_bots.json");
        fs::write(&path, "{ not json").await?;

        let result = JsonFileStore::new(&path).load().await;

        assert!(matches!(result, Err(BotvisorError::RegistryIo { .. })));
        // A malformed document is never overwritten by the bootstrap.
        assert_eq!(fs::read_to_string(&path).await?, "{ not json");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_save_load_cycles_keep_paths_canonical() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("managed_bots.json");
        fs::write(
            &path,
            r#"{
                "alpha": { "token": "tok123", "status": "stopped", "filePath": "bots\\alpha\\index.js" },
                "beta": { "token": "tok456", "status": "running", "filePath": "bots/beta/index.js", "pid": 77 }
            }"#,
        )
        .await?;
        let store = JsonFileStore::new(&path);

        let first = store.load().await?;
        store.save(&first).await?;
        let second = store.load().await?;
        store.save(&second).await?;
        let third = store.load().await?;

        assert_eq!(first, third);
        assert_eq!(
            third["alpha"].get_entry_path().as_str(),
            "bots/alpha/index.js"
        );
        assert_eq!(*third["beta"].get_status(), UnitStatus::Running);
        assert_eq!(*third["beta"].get_pid(), Some(77));
        assert!(!fs::read_to_string(&path).await?.contains('\\'));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_save_leaves_no_temp_file() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("managed_bots.json");
        let store = JsonFileStore::new(&path);

        let mut registry = Registry::new();
        registry.insert(
            "alpha".to_string(),
            UnitRecord::new("tok123", "bots/alpha/index.js"),
        );
        store.save(&registry).await?;

        assert!(path.exists());
        assert!(!temp_dir.path().join("managed_bots.json.tmp").exists());

        Ok(())
    }
}
