//! Launching units.

use std::{path::Path, process::Stdio, sync::Arc};

use tokio::{
    fs,
    process::{Child, Command},
    sync::watch,
    time,
};

use crate::{
    config::SupervisorConfig,
    registry::UnitRecord,
    runtime::{self, Termination},
    BotvisorError, BotvisorResult,
};

use super::{Lifecycle, ProcessHandle};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Starts units: installs their dependencies, spawns their process and watches it.
#[derive(Clone)]
pub struct Launcher {
    config: Arc<SupervisorConfig>,
    lifecycle: Arc<Lifecycle>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Launcher {
    /// Creates a launcher.
    pub fn new(config: Arc<SupervisorConfig>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { config, lifecycle }
    }

    /// Starts a stopped unit and returns its process id.
    ///
    /// The unit is `Starting` until its process has survived the startup grace period, then the
    /// `Running` status is persisted. On any failure the unit is back to `Stopped`.
    pub async fn start(&self, name: &str) -> BotvisorResult<u32> {
        let record = self.lifecycle.begin_start(name).await?;

        match self.launch(name, &record).await {
            Ok(pid) => Ok(pid),
            Err(e) => {
                self.lifecycle.abort_start(name).await;
                tracing::error!("failed to start unit {}: {}", name, e);
                Err(e)
            }
        }
    }

    async fn launch(&self, name: &str, record: &UnitRecord) -> BotvisorResult<u32> {
        let working_dir = botvisor_utils::unix_to_host_path(&record.get_working_dir());
        let entry_path = record.get_entry_path();
        let entry_arg = entry_path.file_name().unwrap_or(entry_path.as_str());

        let manifest_path = working_dir.join(self.config.get_manifest_file());
        if !fs::try_exists(&manifest_path).await? {
            return Err(BotvisorError::MissingManifest(manifest_path));
        }

        self.install_dependencies(name, &working_dir).await?;

        let mut child = self.spawn_unit(&working_dir, entry_arg)?;
        let pid = child.id().ok_or_else(|| BotvisorError::UnitExitedEarly {
            name: name.to_string(),
            exit_code: None,
        })?;
        tracing::info!("spawned unit {} with pid {}", name, pid);

        self.confirm_startup(name, &mut child).await?;

        let (exited_tx, exited_rx) = watch::channel(false);
        let handle = ProcessHandle::new(pid, exited_rx);
        if let Err(e) = self.lifecycle.transition_to_running(name, Some(handle)).await {
            tracing::warn!("killing unit {} (pid {}) that could not be recorded", name, pid);
            let _ = runtime::terminate_group(pid, Termination::Forced).await;
            let _ = child.wait().await;
            return Err(e);
        }

        tokio::spawn(observe_exit(
            self.lifecycle.clone(),
            name.to_string(),
            pid,
            child,
            exited_tx,
        ));

        Ok(pid)
    }

    async fn install_dependencies(&self, name: &str, working_dir: &Path) -> BotvisorResult<()> {
        let program = self.config.get_install_program();
        tracing::info!(
            "installing dependencies of unit {} in {}",
            name,
            working_dir.display()
        );

        let mut command = Command::new(program);
        command
            .args(self.config.get_install_args())
            .current_dir(working_dir)
            .env(
                self.config.get_profile_env_var(),
                self.config.get_install_profile(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        runtime::isolate_process_group(&mut command);

        let mut child = command.spawn().map_err(|e| BotvisorError::LauncherSpawn {
            program: program.clone(),
            source: e,
        })?;

        let timeout = *self.config.get_install_timeout();
        let status = match time::timeout(timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| BotvisorError::LauncherSpawn {
                program: program.clone(),
                source: e,
            })?,
            Err(_) => {
                if let Some(pid) = child.id() {
                    let _ = runtime::terminate_group(pid, Termination::Forced).await;
                }
                let _ = child.wait().await;
                return Err(BotvisorError::DependencyInstallTimeout {
                    name: name.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        if !status.success() {
            return Err(BotvisorError::DependencyInstall {
                name: name.to_string(),
                exit_code: status.code(),
            });
        }

        tracing::debug!("dependencies of unit {} installed", name);
        Ok(())
    }

    fn spawn_unit(&self, working_dir: &Path, entry_arg: &str) -> BotvisorResult<Child> {
        let program = self.config.get_run_program();

        let mut command = Command::new(program);
        command
            .arg(entry_arg)
            .current_dir(working_dir)
            .env(
                self.config.get_profile_env_var(),
                self.config.get_run_profile(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        runtime::isolate_process_group(&mut command);

        command.spawn().map_err(|e| BotvisorError::LauncherSpawn {
            program: program.clone(),
            source: e,
        })
    }

    /// Fails if the process exits within the startup grace period.
    async fn confirm_startup(&self, name: &str, child: &mut Child) -> BotvisorResult<()> {
        let grace = *self.config.get_startup_grace();
        if grace.is_zero() {
            return Ok(());
        }

        match time::timeout(grace, child.wait()).await {
            Err(_) => Ok(()),
            Ok(Ok(status)) => Err(BotvisorError::UnitExitedEarly {
                name: name.to_string(),
                exit_code: status.code(),
            }),
            Ok(Err(e)) => Err(BotvisorError::LauncherSpawn {
                program: self.config.get_run_program().clone(),
                source: e,
            }),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn observe_exit(
    lifecycle: Arc<Lifecycle>,
    name: String,
    pid: u32,
    mut child: Child,
    exited: watch::Sender<bool>,
) {
    let exit_code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::error!("failed to wait for unit {} (pid {}): {}", name, pid, e);
            None
        }
    };
    let _ = exited.send(true);

    match lifecycle.record_exit(&name, pid, exit_code).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!("unit {} (pid {}) exited after stop", name, pid),
        Err(e) => tracing::error!("failed to record exit of unit {}: {}", name, e),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
