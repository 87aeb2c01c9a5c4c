//! The unit lifecycle state machine.
//!
//! [`Lifecycle`] is the single source of truth for what is running. It owns the in-memory
//! registry, the process handles of running units and the transient `Starting`/stopping
//! bookkeeping, and it persists every durable change through a [`RegistryStore`] before the
//! change becomes visible.
//!
//! Durable transitions:
//! - `Stopped → Running` via [`Lifecycle::transition_to_running`]
//! - `Running → Stopped` via [`Lifecycle::transition_to_stopped`],
//!   [`Lifecycle::transition_all_to_stopped`], [`Lifecycle::record_exit`] and
//!   [`Lifecycle::reconcile`]
//!
//! Every mutation is applied to a copy of the registry, saved, and only then swapped in, all under
//! one lock, so two concurrent mutations can never lose each other's update and a failed save
//! leaves memory equal to disk.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{broadcast, watch, Mutex};

use crate::{
    config::DEFAULT_EVENT_CAPACITY,
    registry::{Registry, RegistryStore, UnitRecord, UnitState, UnitSummary},
    runtime, BotvisorError, BotvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lifecycle state machine of all units.
pub struct Lifecycle {
    store: Arc<dyn RegistryStore>,
    inner: Mutex<LifecycleInner>,
    events: broadcast::Sender<UnitEvent>,
}

struct LifecycleInner {
    registry: Registry,
    handles: HashMap<String, ProcessHandle>,
    starting: HashSet<String>,
    stopping: HashSet<String>,
    reserved: HashSet<String>,
}

/// An in-memory handle on a running unit's process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    exited: watch::Receiver<bool>,
}

/// A unit claimed for termination.
#[derive(Debug, Clone)]
pub struct StopTarget {
    /// The unit name.
    pub name: String,

    /// The recorded process id, if any.
    pub pid: Option<u32>,

    /// The live handle, if this process launched the unit.
    pub handle: Option<ProcessHandle>,
}

/// Something that happened to a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    /// The unit was started.
    Started {
        /// The unit name.
        name: String,

        /// The process id, if known.
        pid: Option<u32>,
    },

    /// The unit was stopped on request.
    Stopped {
        /// The unit name.
        name: String,
    },

    /// The unit's process exited without being asked to.
    Exited {
        /// The unit name.
        name: String,

        /// The process id.
        pid: u32,

        /// The exit code, `None` if the process was killed by a signal.
        exit_code: Option<i32>,
    },
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Lifecycle {
    /// Loads the registry from `store` and builds the state machine on top of it.
    pub async fn open(store: Arc<dyn RegistryStore>) -> BotvisorResult<Self> {
        let registry = store.load().await?;
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);

        Ok(Self {
            store,
            inner: Mutex::new(LifecycleInner {
                registry,
                handles: HashMap::new(),
                starting: HashSet::new(),
                stopping: HashSet::new(),
                reserved: HashSet::new(),
            }),
            events,
        })
    }

    /// Subscribes to unit events.
    pub fn subscribe(&self) -> broadcast::Receiver<UnitEvent> {
        self.events.subscribe()
    }

    /// The observable state of one unit.
    pub async fn state_of(&self, name: &str) -> BotvisorResult<UnitState> {
        let inner = self.inner.lock().await;
        let record = inner
            .registry
            .get(name)
            .ok_or_else(|| BotvisorError::NotFound(name.to_string()))?;

        Ok(inner.state_of(name, record))
    }

    /// Summaries of every unit, ordered by name.
    pub async fn summaries(&self) -> Vec<UnitSummary> {
        let inner = self.inner.lock().await;
        inner
            .registry
            .iter()
            .map(|(name, record)| inner.summary(name, record))
            .collect()
    }

    /// Reserves a name for a unit that is being provisioned.
    ///
    /// Fails with [`BotvisorError::DuplicateName`] if the name is registered or reserved.
    pub async fn reserve(&self, name: &str) -> BotvisorResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.registry.contains_key(name) || inner.reserved.contains(name) {
            return Err(BotvisorError::DuplicateName(name.to_string()));
        }

        inner.reserved.insert(name.to_string());
        Ok(())
    }

    /// Drops a reservation after a failed provisioning.
    pub async fn release(&self, name: &str) {
        self.inner.lock().await.reserved.remove(name);
    }

    /// Inserts a new record and persists the registry. Consumes the name's reservation.
    pub async fn register(&self, name: &str, record: UnitRecord) -> BotvisorResult<()> {
        let mut inner = self.inner.lock().await;
        inner.reserved.remove(name);

        if inner.registry.contains_key(name) {
            return Err(BotvisorError::DuplicateName(name.to_string()));
        }

        let mut next = inner.registry.clone();
        next.insert(name.to_string(), record);
        self.commit(&mut inner, next).await?;

        tracing::info!("registered unit {}", name);
        Ok(())
    }

    /// Moves a stopped unit to `Starting` and returns its record.
    ///
    /// Fails with [`BotvisorError::NotFound`] if the unit does not exist and with
    /// [`BotvisorError::AlreadyRunning`] if it is starting or running.
    pub async fn begin_start(&self, name: &str) -> BotvisorResult<UnitRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| BotvisorError::NotFound(name.to_string()))?;

        if record.is_running() || inner.starting.contains(name) {
            return Err(BotvisorError::AlreadyRunning(name.to_string()));
        }

        inner.starting.insert(name.to_string());
        tracing::debug!("unit {} is starting", name);

        Ok(record)
    }

    /// Returns a unit from `Starting` to `Stopped` after a failed launch.
    pub async fn abort_start(&self, name: &str) {
        if self.inner.lock().await.starting.remove(name) {
            tracing::debug!("start of unit {} aborted", name);
        }
    }

    /// Marks a unit as running and persists the registry.
    ///
    /// Fails with [`BotvisorError::NotFound`] if the unit does not exist and with
    /// [`BotvisorError::AlreadyRunning`] if it is already running.
    pub async fn transition_to_running(
        &self,
        name: &str,
        handle: Option<ProcessHandle>,
    ) -> BotvisorResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .registry
            .get(name)
            .ok_or_else(|| BotvisorError::NotFound(name.to_string()))?;

        if record.is_running() {
            return Err(BotvisorError::AlreadyRunning(name.to_string()));
        }

        let pid = handle.as_ref().map(ProcessHandle::pid);
        let mut next = inner.registry.clone();
        if let Some(record) = next.get_mut(name) {
            record.mark_running(pid);
        }
        self.commit(&mut inner, next).await?;

        inner.starting.remove(name);
        if let Some(handle) = handle {
            inner.handles.insert(name.to_string(), handle);
        }

        tracing::info!("unit {} is running (pid {:?})", name, pid);
        let _ = self.events.send(UnitEvent::Started {
            name: name.to_string(),
            pid,
        });

        Ok(())
    }

    /// Claims a running unit for termination.
    ///
    /// The unit's handle is detached so that its exit is not reported as unexpected. Fails with
    /// [`BotvisorError::NotFound`] if the unit does not exist and with
    /// [`BotvisorError::NotRunning`] if it is stopped, starting or already being stopped.
    pub async fn claim_stop(&self, name: &str) -> BotvisorResult<StopTarget> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .registry
            .get(name)
            .ok_or_else(|| BotvisorError::NotFound(name.to_string()))?;

        if !record.is_running() || inner.stopping.contains(name) {
            return Err(BotvisorError::NotRunning(name.to_string()));
        }

        let pid = *record.get_pid();
        Ok(inner.claim(name, pid))
    }

    /// Claims every running unit for termination.
    pub async fn claim_stop_all(&self) -> Vec<StopTarget> {
        let mut inner = self.inner.lock().await;
        let running: Vec<(String, Option<u32>)> = inner
            .registry
            .iter()
            .filter(|(name, record)| record.is_running() && !inner.stopping.contains(*name))
            .map(|(name, record)| (name.clone(), *record.get_pid()))
            .collect();

        running
            .into_iter()
            .map(|(name, pid)| inner.claim(&name, pid))
            .collect()
    }

    /// Gives a claimed unit back after its termination failed.
    pub async fn abort_stop(&self, target: StopTarget) {
        let mut inner = self.inner.lock().await;
        inner.stopping.remove(&target.name);
        if let Some(handle) = target.handle {
            inner.handles.insert(target.name, handle);
        }
    }

    /// Marks a unit as stopped and persists the registry.
    ///
    /// Fails with [`BotvisorError::NotFound`] if the unit does not exist and with
    /// [`BotvisorError::NotRunning`] if it is not running. The unit's stop claim is released on
    /// every path, so a failed save leaves it `Running` and stoppable again.
    pub async fn transition_to_stopped(&self, name: &str) -> BotvisorResult<()> {
        let mut inner = self.inner.lock().await;
        inner.stopping.remove(name);

        let record = inner
            .registry
            .get(name)
            .ok_or_else(|| BotvisorError::NotFound(name.to_string()))?;

        if !record.is_running() {
            return Err(BotvisorError::NotRunning(name.to_string()));
        }

        let mut next = inner.registry.clone();
        if let Some(record) = next.get_mut(name) {
            record.mark_stopped();
        }
        self.commit(&mut inner, next).await?;

        inner.handles.remove(name);

        tracing::info!("unit {} is stopped", name);
        let _ = self.events.send(UnitEvent::Stopped {
            name: name.to_string(),
        });

        Ok(())
    }

    /// Marks every named unit that is still running as stopped, persisting the registry once.
    ///
    /// The stop claims of `names` are released even if the save fails.
    pub async fn transition_all_to_stopped(&self, names: &[String]) -> BotvisorResult<()> {
        let mut inner = self.inner.lock().await;
        for name in names {
            inner.stopping.remove(name);
        }

        let mut next = inner.registry.clone();
        let mut stopped = Vec::new();
        for name in names {
            if let Some(record) = next.get_mut(name).filter(|record| record.is_running()) {
                record.mark_stopped();
                stopped.push(name.clone());
            }
        }
        self.commit(&mut inner, next).await?;

        for name in names {
            inner.handles.remove(name);
        }

        for name in stopped {
            tracing::info!("unit {} is stopped", name);
            let _ = self.events.send(UnitEvent::Stopped { name });
        }

        Ok(())
    }

    /// Records that the process `pid` of a unit exited.
    ///
    /// If the exit was not requested (the unit still owns a handle for `pid`), the unit is moved
    /// to `Stopped` and an [`UnitEvent::Exited`] is emitted. Returns whether the exit was
    /// unexpected.
    pub async fn record_exit(
        &self,
        name: &str,
        pid: u32,
        exit_code: Option<i32>,
    ) -> BotvisorResult<bool> {
        let mut inner = self.inner.lock().await;
        let owned = inner
            .handles
            .get(name)
            .is_some_and(|handle| handle.pid == pid);

        if !owned {
            return Ok(false);
        }

        inner.handles.remove(name);

        let mut next = inner.registry.clone();
        if let Some(record) = next
            .get_mut(name)
            .filter(|record| record.is_running() && *record.get_pid() == Some(pid))
        {
            record.mark_stopped();
            self.commit(&mut inner, next).await?;
        }

        tracing::warn!(
            "unit {} (pid {}) exited unexpectedly with code {:?}",
            name,
            pid,
            exit_code
        );
        let _ = self.events.send(UnitEvent::Exited {
            name: name.to_string(),
            pid,
            exit_code,
        });

        Ok(true)
    }

    /// Moves running units whose recorded process no longer exists to `Stopped`.
    ///
    /// Units owned by a live handle are trusted, units without a recorded pid are left alone.
    /// Returns the names of the units that were stopped.
    pub async fn reconcile(&self) -> BotvisorResult<Vec<String>> {
        let mut inner = self.inner.lock().await;

        let candidates: Vec<(String, Option<u32>)> = inner
            .registry
            .iter()
            .filter(|(name, record)| {
                record.is_running()
                    && !inner.handles.contains_key(*name)
                    && !inner.stopping.contains(*name)
            })
            .map(|(name, record)| (name.clone(), *record.get_pid()))
            .collect();

        let mut dead = Vec::new();
        for (name, pid) in candidates {
            match pid {
                Some(pid) if !runtime::is_alive(pid).await => dead.push(name),
                Some(_) => {}
                None => tracing::debug!("unit {} is running without a known pid", name),
            }
        }

        if dead.is_empty() {
            return Ok(dead);
        }

        let mut next = inner.registry.clone();
        for name in &dead {
            if let Some(record) = next.get_mut(name) {
                record.mark_stopped();
            }
        }
        self.commit(&mut inner, next).await?;

        for name in &dead {
            tracing::warn!("unit {} is no longer alive, marked as stopped", name);
        }

        Ok(dead)
    }

    async fn commit(&self, inner: &mut LifecycleInner, next: Registry) -> BotvisorResult<()> {
        self.store.save(&next).await?;
        inner.registry = next;
        Ok(())
    }
}

impl LifecycleInner {
    fn state_of(&self, name: &str, record: &UnitRecord) -> UnitState {
        if record.is_running() {
            UnitState::Running
        } else if self.starting.contains(name) {
            UnitState::Starting
        } else {
            UnitState::Stopped
        }
    }

    fn summary(&self, name: &str, record: &UnitRecord) -> UnitSummary {
        UnitSummary {
            name: name.to_string(),
            state: self.state_of(name, record),
            entry_path: record.get_entry_path().to_string(),
            pid: *record.get_pid(),
        }
    }

    fn claim(&mut self, name: &str, pid: Option<u32>) -> StopTarget {
        self.stopping.insert(name.to_string());
        StopTarget {
            name: name.to_string(),
            pid,
            handle: self.handles.remove(name),
        }
    }
}

impl ProcessHandle {
    /// Creates a handle for `pid` whose `exited` flag turns true when the process is reaped.
    pub fn new(pid: u32, exited: watch::Receiver<bool>) -> Self {
        Self { pid, exited }
    }

    /// The process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Waits up to `timeout` for the process to exit. Returns whether it did.
    pub async fn wait_exit(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.exited.wait_for(|exited| *exited)).await {
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        management::testing::{running_record, stopped_record, CountingStore},
        registry::UnitStatus,
    };

    async fn lifecycle_with(units: &[(&str, UnitRecord)]) -> (Lifecycle, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::with_units(units));
        let lifecycle = Lifecycle::open(store.clone()).await.unwrap();
        store.reset_saves();
        (lifecycle, store)
    }

    #[test_log::test(tokio::test)]
    async fn test_transition_to_running_persists() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[("alpha", stopped_record("alpha"))]).await;

        lifecycle.transition_to_running("alpha", None).await?;

        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Running);
        assert_eq!(
            *store.stored()["alpha"].get_status(),
            UnitStatus::Running
        );
        assert_eq!(store.saves(), 1);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_transition_to_running_rejects_running_and_missing() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[("alpha", running_record("alpha", None))]).await;

        let result = lifecycle.transition_to_running("alpha", None).await;
        assert!(matches!(result, Err(BotvisorError::AlreadyRunning(_))));

        let result = lifecycle.transition_to_running("ghost", None).await;
        assert!(matches!(result, Err(BotvisorError::NotFound(_))));

        assert_eq!(store.saves(), 0);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_transition_to_stopped_rejects_stopped() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[("alpha", stopped_record("alpha"))]).await;

        let result = lifecycle.transition_to_stopped("alpha").await;
        assert!(matches!(result, Err(BotvisorError::NotRunning(_))));
        assert_eq!(store.saves(), 0);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_save_keeps_memory_equal_to_disk() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[("alpha", stopped_record("alpha"))]).await;
        store.fail_saves(true);

        let result = lifecycle.transition_to_running("alpha", None).await;
        assert!(matches!(result, Err(BotvisorError::RegistryIo { .. })));
        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Stopped);
        assert_eq!(
            *store.stored()["alpha"].get_status(),
            UnitStatus::Stopped
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_stop_save_releases_claim() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[
            ("alpha", running_record("alpha", None)),
            ("beta", running_record("beta", None)),
        ])
        .await;
        store.fail_saves(true);

        lifecycle.claim_stop("alpha").await?;
        let result = lifecycle.transition_to_stopped("alpha").await;
        assert!(matches!(result, Err(BotvisorError::RegistryIo { .. })));

        let names: Vec<String> = lifecycle
            .claim_stop_all()
            .await
            .into_iter()
            .map(|target| target.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        let result = lifecycle.transition_all_to_stopped(&names).await;
        assert!(matches!(result, Err(BotvisorError::RegistryIo { .. })));

        store.fail_saves(false);
        lifecycle.claim_stop("alpha").await?;
        lifecycle.transition_to_stopped("alpha").await?;
        assert_eq!(lifecycle.claim_stop_all().await.len(), 1);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_starting_guards_concurrent_start() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[("alpha", stopped_record("alpha"))]).await;

        lifecycle.begin_start("alpha").await?;
        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Starting);

        let result = lifecycle.begin_start("alpha").await;
        assert!(matches!(result, Err(BotvisorError::AlreadyRunning(_))));

        // Starting is never written to disk.
        assert_eq!(store.saves(), 0);

        lifecycle.abort_start("alpha").await;
        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Stopped);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_reservation_blocks_duplicate_names() -> BotvisorResult<()> {
        let (lifecycle, _store) = lifecycle_with(&[("alpha", stopped_record("alpha"))]).await;

        assert!(matches!(
            lifecycle.reserve("alpha").await,
            Err(BotvisorError::DuplicateName(_))
        ));

        lifecycle.reserve("beta").await?;
        assert!(matches!(
            lifecycle.reserve("beta").await,
            Err(BotvisorError::DuplicateName(_))
        ));

        lifecycle.release("beta").await;
        lifecycle.reserve("beta").await?;

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_stop_all_transition_saves_once() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[
            ("alpha", running_record("alpha", None)),
            ("beta", stopped_record("beta")),
            ("gamma", running_record("gamma", None)),
        ])
        .await;

        let targets = lifecycle.claim_stop_all().await;
        let names: Vec<String> = targets.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["alpha", "gamma"]);

        lifecycle.transition_all_to_stopped(&names).await?;

        assert_eq!(store.saves(), 1);
        assert!(store.stored().values().all(|record| !record.is_running()));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_claimed_unit_cannot_be_claimed_twice() -> BotvisorResult<()> {
        let (lifecycle, _store) = lifecycle_with(&[("alpha", running_record("alpha", None))]).await;

        let target = lifecycle.claim_stop("alpha").await?;
        assert!(matches!(
            lifecycle.claim_stop("alpha").await,
            Err(BotvisorError::NotRunning(_))
        ));

        lifecycle.abort_stop(target).await;
        lifecycle.claim_stop("alpha").await?;

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_record_exit_only_reports_owned_processes() -> BotvisorResult<()> {
        let (lifecycle, store) = lifecycle_with(&[("alpha", stopped_record("alpha"))]).await;
        let mut events = lifecycle.subscribe();

        let (_tx, rx) = watch::channel(false);
        lifecycle
            .transition_to_running("alpha", Some(ProcessHandle::new(4242, rx)))
            .await?;

        // Some other pid exiting is not this unit's business.
        assert!(!lifecycle.record_exit("alpha", 1, Some(0)).await?);
        assert!(lifecycle.record_exit("alpha", 4242, Some(1)).await?);

        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Stopped);
        assert_eq!(*store.stored()["alpha"].get_pid(), None);

        assert!(matches!(events.recv().await, Ok(UnitEvent::Started { .. })));
        assert_eq!(
            events.recv().await.ok(),
            Some(UnitEvent::Exited {
                name: "alpha".to_string(),
                pid: 4242,
                exit_code: Some(1),
            })
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_record_exit_after_claim_is_expected() -> BotvisorResult<()> {
        let (lifecycle, _store) = lifecycle_with(&[("alpha", stopped_record("alpha"))]).await;

        let (_tx, rx) = watch::channel(false);
        lifecycle
            .transition_to_running("alpha", Some(ProcessHandle::new(4242, rx)))
            .await?;
        let target = lifecycle.claim_stop("alpha").await?;
        assert_eq!(target.pid, Some(4242));
        assert!(target.handle.is_some());

        assert!(!lifecycle.record_exit("alpha", 4242, None).await?);
        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Running);

        lifecycle.transition_to_stopped("alpha").await?;
        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Stopped);

        Ok(())
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_reconcile_stops_dead_pids_only() -> BotvisorResult<()> {
        let mut child = tokio::process::Command::new("true").spawn()?;
        let dead_pid = child.id().unwrap_or_default();
        child.wait().await?;

        let (lifecycle, store) = lifecycle_with(&[
            ("alpha", running_record("alpha", Some(dead_pid))),
            ("beta", running_record("beta", Some(std::process::id()))),
            ("gamma", running_record("gamma", None)),
        ])
        .await;

        let reconciled = lifecycle.reconcile().await?;

        assert_eq!(reconciled, vec!["alpha"]);
        assert_eq!(lifecycle.state_of("alpha").await?, UnitState::Stopped);
        assert_eq!(lifecycle.state_of("beta").await?, UnitState::Running);
        assert_eq!(lifecycle.state_of("gamma").await?, UnitState::Running);
        assert_eq!(store.saves(), 1);

        Ok(())
    }
}
