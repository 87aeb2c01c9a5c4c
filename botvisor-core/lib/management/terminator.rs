//! Stopping units.

use std::{sync::Arc, time::Duration};

use tokio::time::{self, Instant};

use crate::{
    config::SupervisorConfig,
    runtime::{self, SignalOutcome, Termination},
    BotvisorError, BotvisorResult,
};

use super::{Lifecycle, StopTarget};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Stops units by terminating their process groups.
#[derive(Clone)]
pub struct Terminator {
    config: Arc<SupervisorConfig>,
    lifecycle: Arc<Lifecycle>,
}

/// The result of stopping every unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopAllOutcome {
    /// No unit was running; nothing was signalled or written.
    NothingRunning,

    /// These units were running and are now stopped.
    Stopped(Vec<String>),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Terminator {
    /// Creates a terminator.
    pub fn new(config: Arc<SupervisorConfig>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { config, lifecycle }
    }

    /// Stops a running unit.
    pub async fn stop(&self, name: &str) -> BotvisorResult<()> {
        let target = self.lifecycle.claim_stop(name).await?;

        if let Err(e) = self.terminate(std::slice::from_ref(&target)).await {
            self.lifecycle.abort_stop(target).await;
            return Err(e);
        }

        self.lifecycle.transition_to_stopped(name).await
    }

    /// Stops every running unit, persisting the registry once.
    pub async fn stop_all(&self) -> BotvisorResult<StopAllOutcome> {
        let targets = self.lifecycle.claim_stop_all().await;
        if targets.is_empty() {
            tracing::info!("no units are running");
            return Ok(StopAllOutcome::NothingRunning);
        }

        if let Err(e) = self.terminate(&targets).await {
            for target in targets {
                self.lifecycle.abort_stop(target).await;
            }
            return Err(e);
        }

        let names: Vec<String> = targets.into_iter().map(|target| target.name).collect();
        self.lifecycle.transition_all_to_stopped(&names).await?;

        Ok(StopAllOutcome::Stopped(names))
    }

    /// Terminates the processes of `targets`.
    ///
    /// Every tracked group is asked to exit first, then each one gets until the stop timeout
    /// before it is killed. Targets without a pid fall back to a single kill by runtime name.
    async fn terminate(&self, targets: &[StopTarget]) -> BotvisorResult<()> {
        let mut signalled = Vec::new();
        let mut untracked = Vec::new();

        for target in targets {
            let Some(pid) = target.pid else {
                untracked.push(target.name.as_str());
                continue;
            };

            tracing::info!("stopping unit {} (pid {})", target.name, pid);
            match runtime::terminate_group(pid, Termination::Graceful).await {
                Ok(SignalOutcome::Delivered) => signalled.push((target, pid)),
                Ok(SignalOutcome::Gone) => {
                    tracing::debug!("unit {} (pid {}) was already gone", target.name, pid)
                }
                Err(e) => return Err(termination_error(&target.name, e)),
            }
        }

        let deadline = Instant::now() + *self.config.get_stop_timeout();
        for (target, pid) in signalled {
            if wait_for_exit(target, pid, deadline).await {
                continue;
            }

            tracing::warn!(
                "unit {} (pid {}) did not exit in time, killing it",
                target.name,
                pid
            );
            runtime::terminate_group(pid, Termination::Forced)
                .await
                .map_err(|e| termination_error(&target.name, e))?;

            let deadline = Instant::now() + *self.config.get_stop_timeout();
            if !wait_for_exit(target, pid, deadline).await {
                tracing::error!("unit {} (pid {}) survived a hard kill", target.name, pid);
            }
        }

        if !untracked.is_empty() {
            let runtime_process_name = self.config.get_runtime_process_name();
            tracing::warn!(
                "no process id recorded for {}, killing every '{}' process",
                untracked.join(", "),
                runtime_process_name
            );
            runtime::kill_by_name(runtime_process_name)
                .await
                .map_err(|e| termination_error(&untracked.join(", "), e))?;
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn wait_for_exit(target: &StopTarget, pid: u32, deadline: Instant) -> bool {
    if let Some(handle) = &target.handle {
        let remaining = deadline.saturating_duration_since(Instant::now());
        return handle.clone().wait_exit(remaining).await;
    }

    loop {
        if !runtime::is_alive(pid).await {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }

        time::sleep(LIVENESS_POLL_INTERVAL).await;
    }
}

fn termination_error(name: &str, error: std::io::Error) -> BotvisorError {
    BotvisorError::Termination {
        name: name.to_string(),
        message: error.to_string(),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
