//! The supervisor facade.

use std::{future::Future, sync::Arc};

use tokio::sync::broadcast;

use crate::{
    config::SupervisorConfig,
    registry::{JsonFileStore, RegistryLock, RegistryStore, UnitSummary},
    BotvisorError, BotvisorResult,
};

use super::{Launcher, Lifecycle, Provisioner, StopAllOutcome, Terminator, UnitEvent};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Supervises every unit under one home directory.
///
/// Mutating operations run on their own task, so a caller that goes away midway (a dropped HTTP
/// request, for example) never leaves a unit half started or half stopped.
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    lifecycle: Arc<Lifecycle>,
    launcher: Launcher,
    terminator: Terminator,
    provisioner: Provisioner,
    _registry_lock: Option<RegistryLock>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Supervisor {
    /// Opens the supervisor with the registry document named by `config`.
    ///
    /// The registry stays locked for as long as the supervisor lives. Fails with
    /// [`BotvisorError::RegistryLocked`] if another supervisor, such as a running server, already
    /// holds it.
    pub async fn open(config: SupervisorConfig) -> BotvisorResult<Self> {
        let registry_path = config.get_registry_path();
        let lock = RegistryLock::acquire(&registry_path).await?;
        let store = Arc::new(JsonFileStore::new(registry_path));

        let mut supervisor = Self::with_store(config, store).await?;
        supervisor._registry_lock = Some(lock);

        Ok(supervisor)
    }

    /// Opens the supervisor with a custom registry store.
    ///
    /// Units recorded as running whose process is gone are marked stopped right away.
    pub async fn with_store(
        config: SupervisorConfig,
        store: Arc<dyn RegistryStore>,
    ) -> BotvisorResult<Self> {
        let config = Arc::new(config);
        let lifecycle = Arc::new(Lifecycle::open(store).await?);

        let supervisor = Self {
            launcher: Launcher::new(config.clone(), lifecycle.clone()),
            terminator: Terminator::new(config.clone(), lifecycle.clone()),
            provisioner: Provisioner::new(config.clone(), lifecycle.clone()),
            config,
            lifecycle,
            _registry_lock: None,
        };

        let reconciled = supervisor.lifecycle.reconcile().await?;
        if !reconciled.is_empty() {
            tracing::info!("reconciled {} stale units on open", reconciled.len());
        }

        Ok(supervisor)
    }

    /// The supervisor configuration.
    pub fn get_config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Creates a new stopped unit.
    pub async fn create(&self, name: &str, credential: &str) -> BotvisorResult<UnitSummary> {
        let provisioner = self.provisioner.clone();
        let (unit, credential) = (name.to_string(), credential.to_string());
        detached(async move { provisioner.create(&unit, &credential).await }).await?;

        self.get(name).await
    }

    /// Starts a unit and returns its process id.
    pub async fn start(&self, name: &str) -> BotvisorResult<u32> {
        let launcher = self.launcher.clone();
        let name = name.to_string();
        detached(async move { launcher.start(&name).await }).await
    }

    /// Stops a running unit.
    pub async fn stop(&self, name: &str) -> BotvisorResult<()> {
        let terminator = self.terminator.clone();
        let name = name.to_string();
        detached(async move { terminator.stop(&name).await }).await
    }

    /// Stops every running unit.
    pub async fn stop_all(&self) -> BotvisorResult<StopAllOutcome> {
        let terminator = self.terminator.clone();
        detached(async move { terminator.stop_all().await }).await
    }

    /// Summaries of every unit, ordered by name.
    pub async fn list(&self) -> Vec<UnitSummary> {
        self.lifecycle.summaries().await
    }

    /// The summary of one unit.
    pub async fn get(&self, name: &str) -> BotvisorResult<UnitSummary> {
        self.lifecycle
            .summaries()
            .await
            .into_iter()
            .find(|summary| summary.name == name)
            .ok_or_else(|| BotvisorError::NotFound(name.to_string()))
    }

    /// Marks running units whose process is gone as stopped and returns their names.
    pub async fn reconcile(&self) -> BotvisorResult<Vec<String>> {
        self.lifecycle.reconcile().await
    }

    /// Subscribes to unit events.
    pub fn subscribe(&self) -> broadcast::Receiver<UnitEvent> {
        self.lifecycle.subscribe()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn detached<T, F>(future: F) -> BotvisorResult<T>
where
    T: Send + 'static,
    F: Future<Output = BotvisorResult<T>> + Send + 'static,
{
    tokio::spawn(future)
        .await
        .map_err(|e| BotvisorError::Internal(format!("supervisor task failed: {}", e)))?
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use tempfile::TempDir;
    use tokio::fs;

    use super::*;
    use crate::{
        management::testing::shell_config,
        registry::{Registry, UnitRecord, UnitState, UnitStatus},
        runtime,
    };

    /// A template whose entry point is a shell script that keeps running.
    async fn write_template(config: &SupervisorConfig) -> BotvisorResult<()> {
        let template_dir = config.get_template_dir();
        fs::create_dir_all(&template_dir).await?;
        fs::write(template_dir.join("package.json"), "{}").await?;
        fs::write(template_dir.join("index.js"), "sleep 30").await?;
        fs::write(template_dir.join("config.json"), "{}").await?;
        Ok(())
    }

    async fn read_registry(config: &SupervisorConfig) -> BotvisorResult<Registry> {
        JsonFileStore::new(config.get_registry_path()).load().await
    }

    #[test_log::test(tokio::test)]
    async fn test_create_start_stop_all_round() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config).await?;
        let supervisor = Supervisor::open(config.clone()).await?;

        let alpha = supervisor.create("alpha", "tok123").await?;
        assert_eq!(alpha.state, UnitState::Stopped);
        assert!(alpha.entry_path.ends_with("/alpha/index.js"));
        supervisor.create("beta", "tok456").await?;

        assert!(matches!(
            supervisor.create("alpha", "tok999").await,
            Err(BotvisorError::DuplicateName(_))
        ));

        let pid = supervisor.start("alpha").await?;
        assert!(matches!(
            supervisor.start("alpha").await,
            Err(BotvisorError::AlreadyRunning(_))
        ));

        let registry = read_registry(&config).await?;
        assert_eq!(*registry["alpha"].get_status(), UnitStatus::Running);
        assert_eq!(*registry["alpha"].get_pid(), Some(pid));
        assert_eq!(registry["alpha"].get_credential(), "tok123");

        let outcome = supervisor.stop_all().await?;
        assert_eq!(outcome, StopAllOutcome::Stopped(vec!["alpha".to_string()]));
        assert!(!runtime::is_alive(pid).await);

        let registry = read_registry(&config).await?;
        assert!(registry.values().all(|record| !record.is_running()));

        assert_eq!(supervisor.stop_all().await?, StopAllOutcome::NothingRunning);

        let names: Vec<String> = supervisor.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_open_reconciles_dead_units() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());

        let mut child = tokio::process::Command::new("true").spawn()?;
        let dead_pid = child.id().unwrap_or_default();
        child.wait().await?;

        let mut record = UnitRecord::new("tok", "bots/alpha/index.js");
        record.mark_running(Some(dead_pid));
        let mut registry = Registry::new();
        registry.insert("alpha".to_string(), record);
        JsonFileStore::new(config.get_registry_path())
            .save(&registry)
            .await?;

        let supervisor = Supervisor::open(config.clone()).await?;

        assert_eq!(supervisor.get("alpha").await?.state, UnitState::Stopped);
        assert_eq!(
            *read_registry(&config).await?["alpha"].get_status(),
            UnitStatus::Stopped
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_units_are_not_found() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let supervisor = Supervisor::open(shell_config(temp_dir.path())).await?;

        assert!(matches!(
            supervisor.start("ghost").await,
            Err(BotvisorError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.stop("ghost").await,
            Err(BotvisorError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.get("ghost").await,
            Err(BotvisorError::NotFound(_))
        ));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_second_supervisor_on_same_home_is_refused() -> BotvisorResult<()> {
        let temp_dir = TempDir::new()?;
        let config = shell_config(temp_dir.path());
        write_template(&config).await?;

        let server = Supervisor::open(config.clone()).await?;
        assert!(matches!(
            Supervisor::open(config.clone()).await,
            Err(BotvisorError::RegistryLocked { holder: Some(pid), .. }) if pid == std::process::id()
        ));

        server.create("alpha", "tok123").await?;
        drop(server);

        let cli = Supervisor::open(config.clone()).await?;
        cli.create("beta", "tok456").await?;

        let names: Vec<String> = read_registry(&config).await?.into_keys().collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        Ok(())
    }
}
