//! Fixtures shared by the management tests.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::fs;

use crate::{
    config::SupervisorConfig,
    registry::{Registry, RegistryStore, UnitRecord},
    BotvisorError, BotvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-memory store that counts saves and can be told to fail them.
#[derive(Default)]
pub(crate) struct CountingStore {
    stored: Mutex<Registry>,
    saves: AtomicUsize,
    fail: AtomicBool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CountingStore {
    pub(crate) fn with_units(units: &[(&str, UnitRecord)]) -> Self {
        let registry = units
            .iter()
            .map(|(name, record)| (name.to_string(), record.clone()))
            .collect();

        Self {
            stored: Mutex::new(registry),
            ..Default::default()
        }
    }

    pub(crate) fn stored(&self) -> Registry {
        self.stored.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_saves(&self) {
        self.saves.store(0, Ordering::SeqCst);
    }

    pub(crate) fn fail_saves(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl RegistryStore for CountingStore {
    async fn load(&self) -> BotvisorResult<Registry> {
        Ok(self.stored())
    }

    async fn save(&self, registry: &Registry) -> BotvisorResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BotvisorError::registry_io(
                "memory",
                std::io::Error::other("save rejected"),
            ));
        }

        if let Ok(mut stored) = self.stored.lock() {
            *stored = registry.clone();
        }
        self.saves.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// A process name no fallback kill will ever match.
pub(crate) const UNMATCHED_RUNTIME: &str = "botvisor-test-runtime-that-matches-nothing";

pub(crate) fn stopped_record(name: &str) -> UnitRecord {
    UnitRecord::new("tok", &format!("bots/{}/index.js", name))
}

pub(crate) fn running_record(name: &str, pid: Option<u32>) -> UnitRecord {
    let mut record = stopped_record(name);
    record.mark_running(pid);
    record
}

/// A configuration that installs with `true` and runs the entry point as a shell script.
pub(crate) fn shell_config(home: &Path) -> SupervisorConfig {
    SupervisorConfig::builder()
        .home_dir(home)
        .install_program("true")
        .install_args(Vec::new())
        .run_program("sh")
        .runtime_process_name(UNMATCHED_RUNTIME)
        .install_timeout(Duration::from_secs(5))
        .startup_grace(Duration::from_millis(200))
        .stop_timeout(Duration::from_millis(500))
        .build()
}

/// Writes a launchable unit whose entry point is `script` and returns its record.
pub(crate) async fn write_unit(
    config: &SupervisorConfig,
    name: &str,
    script: &str,
) -> BotvisorResult<UnitRecord> {
    let dir = config.get_units_dir().join(name);
    fs::create_dir_all(&dir).await?;
    fs::write(dir.join(config.get_manifest_file()), "{}").await?;

    let entry = dir.join(config.get_entry_file());
    fs::write(&entry, script).await?;

    Ok(UnitRecord::new(
        "tok",
        botvisor_utils::host_to_unix_path(&entry).as_str(),
    ))
}
