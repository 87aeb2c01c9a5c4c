//! Provisioning new units from the template.
//!
//! A unit is assembled in a hidden staging directory next to its final location and renamed into
//! place once complete, so a failure at any stage leaves neither a partial directory nor a
//! registry entry behind.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use botvisor_utils::STAGING_DIR_PREFIX;
use serde_json::Value;
use tokio::fs;
use walkdir::WalkDir;

use crate::{
    config::SupervisorConfig,
    registry::UnitRecord,
    BotvisorError, BotvisorResult, ProvisioningStage,
};

use super::Lifecycle;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Creates new units.
#[derive(Clone)]
pub struct Provisioner {
    config: Arc<SupervisorConfig>,
    lifecycle: Arc<Lifecycle>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Provisioner {
    /// Creates a provisioner.
    pub fn new(config: Arc<SupervisorConfig>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { config, lifecycle }
    }

    /// Creates a unit named `name` from the template and registers it as stopped.
    pub async fn create(&self, name: &str, credential: &str) -> BotvisorResult<UnitRecord> {
        validate_unit_name(name)?;
        if credential.trim().is_empty() {
            return Err(BotvisorError::MissingCredential(name.to_string()));
        }

        self.lifecycle.reserve(name).await?;

        let unit_dir = self.config.get_units_dir().join(name);
        let record = match self.assemble(name, credential, &unit_dir).await {
            Ok(record) => record,
            Err(e) => {
                self.lifecycle.release(name).await;
                tracing::error!("failed to provision unit {}: {}", name, e);
                return Err(e);
            }
        };

        if let Err(e) = self.lifecycle.register(name, record.clone()).await {
            if let Err(cleanup) = fs::remove_dir_all(&unit_dir).await {
                tracing::warn!(
                    "failed to remove {} after a failed registration: {}",
                    unit_dir.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!("created unit {} at {}", name, unit_dir.display());
        Ok(record)
    }

    /// Builds the unit in a staging directory and moves it to `unit_dir`.
    async fn assemble(
        &self,
        name: &str,
        credential: &str,
        unit_dir: &Path,
    ) -> BotvisorResult<UnitRecord> {
        let template_dir = self.config.get_template_dir();
        let template_exists = fs::try_exists(&template_dir)
            .await
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::Copy, e))?;
        if !template_exists {
            return Err(BotvisorError::provisioning(
                name,
                ProvisioningStage::Copy,
                format!("template directory {} does not exist", template_dir.display()),
            ));
        }

        let unit_exists = fs::try_exists(unit_dir)
            .await
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::Copy, e))?;
        if unit_exists {
            return Err(BotvisorError::provisioning(
                name,
                ProvisioningStage::Copy,
                format!("{} already exists", unit_dir.display()),
            ));
        }

        let staging_dir = self.staging_dir(name);
        let result = self
            .populate(name, credential, &template_dir, &staging_dir)
            .await;

        let result = match result {
            Ok(()) => fs::rename(&staging_dir, unit_dir)
                .await
                .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::Commit, e)),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if fs::try_exists(&staging_dir).await.unwrap_or(false) {
                let _ = fs::remove_dir_all(&staging_dir).await;
            }
            return Err(e);
        }

        let entry_path = unit_dir.join(self.config.get_entry_file());
        Ok(UnitRecord::new(
            credential,
            botvisor_utils::host_to_unix_path(&entry_path).as_str(),
        ))
    }

    async fn populate(
        &self,
        name: &str,
        credential: &str,
        template_dir: &Path,
        staging_dir: &Path,
    ) -> BotvisorResult<()> {
        let source = template_dir.to_path_buf();
        let destination = staging_dir.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree(&source, &destination))
            .await
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::Copy, e))?
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::Copy, e))?;

        self.seed_scaffold(name, staging_dir)
            .await
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::Scaffold, e))?;

        self.write_credential(name, credential, staging_dir).await
    }

    async fn seed_scaffold(&self, name: &str, staging_dir: &Path) -> io::Result<()> {
        let scaffold_dir = staging_dir.join(self.config.get_scaffold_subdir());
        fs::create_dir_all(&scaffold_dir).await?;

        let placeholder = scaffold_dir.join(self.config.get_entry_file());
        if !fs::try_exists(&placeholder).await? {
            fs::write(&placeholder, format!("// Bot entry point for {}\n", name)).await?;
        }

        Ok(())
    }

    async fn write_credential(
        &self,
        name: &str,
        credential: &str,
        staging_dir: &Path,
    ) -> BotvisorResult<()> {
        let config_path = staging_dir.join(self.config.get_unit_config_file());

        let content = fs::read_to_string(&config_path)
            .await
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::ConfigRead, e))?;

        let mut document: Value = serde_json::from_str(&content)
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::ConfigRead, e))?;

        let Some(fields) = document.as_object_mut() else {
            return Err(BotvisorError::provisioning(
                name,
                ProvisioningStage::ConfigRead,
                format!("{} is not a JSON object", config_path.display()),
            ));
        };
        fields.insert(
            self.config.get_credential_key().clone(),
            Value::String(credential.to_string()),
        );

        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::ConfigWrite, e))?;
        fs::write(&config_path, content)
            .await
            .map_err(|e| BotvisorError::provisioning(name, ProvisioningStage::ConfigWrite, e))?;

        Ok(())
    }

    fn staging_dir(&self, name: &str) -> PathBuf {
        self.config.get_units_dir().join(format!(
            "{}{}-{}",
            STAGING_DIR_PREFIX,
            name,
            uuid::Uuid::new_v4()
        ))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Checks that `name` can be used as a directory name on every platform.
pub fn validate_unit_name(name: &str) -> BotvisorResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(BotvisorError::InvalidUnitName(name.to_string()))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Recursively copies `source` into `destination`, which must not exist yet.
fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        management::testing::{shell_config, stopped_record, CountingStore},
        registry::UnitStatus,
    };

    async fn write_template(config: &SupervisorConfig, unit_config: &str) -> BotvisorResult<()> {
        let template_dir = config.get_template_dir();
        fs::create_dir_all(template_dir.join("lib")).await?;
        fs::write(template_dir.join("package.json"), "{}").await?;
        fs::write(template_dir.join("index.js"), "// main").await?;
        fs::write(template_dir.join("lib").join("util.js"), "// util").await?;
        fs::write(template_dir.join("config.json"), unit_config).await?;
        Ok(())
    }

    async fn provisioner_for(
        config: SupervisorConfig,
        units: &[(&str, UnitRecord)],
    ) -> BotvisorResult<(Provisioner, Arc<Lifecycle>, Arc<CountingStore>)> {
        let store = Arc::new(CountingStore::with_units(units));
        let lifecycle = Arc::new(Lifecycle::open(store.clone()).await?);
        Ok((
            Provisioner::new(Arc::new(config), lifecycle.clone()),
            lifecycle,
            store,
        ))
    }

    async fn leftover_entries(dir: &Path) -> BotvisorResult<Vec<String>> {
        let mut names = Vec::new();
        if !fs::try_exists(dir).await? {
            return Ok(names);
        }

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }

        Ok(names)
    }

    #[test_log::test(tokio::test)]
    async fn test_create_provisions_and_registers_unit() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config, r#"{ "prefix": "!" }"#).await?;
        let units_dir = config.get_units_dir();
        let (provisioner, _lifecycle, store) = provisioner_for(config, &[]).await?;

        let record = provisioner.create("alpha", "tok123").await?;

        let unit_dir = units_dir.join("alpha");
        assert!(record.get_entry_path().as_str().ends_with("/alpha/index.js"));
        assert_eq!(*record.get_status(), UnitStatus::Stopped);
        assert_eq!(store.stored()["alpha"], record);
        assert_eq!(store.saves(), 1);

        assert_eq!(fs::read_to_string(unit_dir.join("lib/util.js")).await?, "// util");
        assert_eq!(
            fs::read_to_string(unit_dir.join("bots/index.js")).await?,
            "// Bot entry point for alpha\n"
        );

        let unit_config: Value =
            serde_json::from_str(&fs::read_to_string(unit_dir.join("config.json")).await?)
                .map_err(io::Error::from)?;
        assert_eq!(unit_config["token"], "tok123");
        assert_eq!(unit_config["prefix"], "!");

        assert_eq!(leftover_entries(&units_dir).await?, vec!["alpha"]);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_create_keeps_existing_scaffold_entry() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config, "{}").await?;
        let scaffold = config.get_template_dir().join("bots");
        fs::create_dir_all(&scaffold).await?;
        fs::write(scaffold.join("index.js"), "// custom").await?;
        let units_dir = config.get_units_dir();
        let (provisioner, _lifecycle, _store) = provisioner_for(config, &[]).await?;

        provisioner.create("alpha", "tok123").await?;

        assert_eq!(
            fs::read_to_string(units_dir.join("alpha/bots/index.js")).await?,
            "// custom"
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_create_rejects_duplicate_name() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config, "{}").await?;
        let (provisioner, _lifecycle, store) =
            provisioner_for(config, &[("alpha", stopped_record("alpha"))]).await?;
        let before = store.stored();

        let result = provisioner.create("alpha", "tok999").await;

        assert!(matches!(result, Err(BotvisorError::DuplicateName(_))));
        assert_eq!(store.stored(), before);
        assert_eq!(store.saves(), 0);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_create_validates_name_and_credential() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config, "{}").await?;
        let (provisioner, _lifecycle, _store) = provisioner_for(config, &[]).await?;

        for name in ["", "../escape", "-flag", "with space", "a/b"] {
            assert!(matches!(
                provisioner.create(name, "tok").await,
                Err(BotvisorError::InvalidUnitName(_))
            ));
        }

        assert!(matches!(
            provisioner.create("alpha", "   ").await,
            Err(BotvisorError::MissingCredential(_))
        ));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_config_rolls_back() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config, "[1, 2, 3]").await?;
        let units_dir = config.get_units_dir();
        let (provisioner, lifecycle, store) = provisioner_for(config, &[]).await?;

        let result = provisioner.create("alpha", "tok123").await;

        assert!(matches!(
            result,
            Err(BotvisorError::Provisioning {
                stage: ProvisioningStage::ConfigRead,
                ..
            })
        ));
        assert!(leftover_entries(&units_dir).await?.is_empty());
        assert!(store.stored().is_empty());

        // The name is free again.
        lifecycle.reserve("alpha").await?;

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_template_fails_at_copy() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let (provisioner, _lifecycle, store) =
            provisioner_for(shell_config(temp_dir.path()), &[]).await?;

        let result = provisioner.create("alpha", "tok123").await;

        assert!(matches!(
            result,
            Err(BotvisorError::Provisioning {
                stage: ProvisioningStage::Copy,
                ..
            })
        ));
        assert!(store.stored().is_empty());

        Ok(())
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_unreadable_units_dir_is_not_reported_as_existing() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config, "{}").await?;
        fs::write(config.get_units_dir(), "not a directory").await?;
        let (provisioner, lifecycle, store) = provisioner_for(config, &[]).await?;

        let result = provisioner.create("alpha", "tok123").await;

        match result {
            Err(BotvisorError::Provisioning {
                stage: ProvisioningStage::Copy,
                message,
                ..
            }) => assert!(!message.contains("already exists"), "{}", message),
            other => panic!("expected a copy failure, got {:?}", other),
        }
        assert!(store.stored().is_empty());
        lifecycle.reserve("alpha").await?;

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_registration_removes_directory() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config, "{}").await?;
        let units_dir = config.get_units_dir();
        let (provisioner, _lifecycle, store) = provisioner_for(config, &[]).await?;
        store.fail_saves(true);

        let result = provisioner.create("alpha", "tok123").await;

        assert!(matches!(result, Err(BotvisorError::RegistryIo { .. })));
        assert!(leftover_entries(&units_dir).await?.is_empty());

        Ok(())
    }

    #[test]
    fn test_validate_unit_name_accepts_portable_names() {
        for name in ["alpha", "Beta_2", "my-bot", "_hidden"] {
            assert!(validate_unit_name(name).is_ok(), "{}", name);
        }
    }
}
