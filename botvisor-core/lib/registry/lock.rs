use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;

use crate::{BotvisorError, BotvisorResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Exclusive ownership of a registry document, released when dropped.
///
/// The lock lives in `<registry>.lock` next to the document and records the pid of its holder.
/// Only one supervisor at a time, whether a running server or a single command line invocation,
/// may rewrite a registry.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryLock {
    /// Takes the lock of the registry at `registry_path`.
    ///
    /// Fails with [`BotvisorError::RegistryLocked`] if another supervisor holds it.
    pub async fn acquire(registry_path: impl Into<PathBuf>) -> BotvisorResult<Self> {
        let registry_path = registry_path.into();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(&registry_path))
            .await
            .map_err(|e| BotvisorError::Internal(format!("registry lock task failed: {}", e)))?
    }

    fn acquire_blocking(registry_path: &Path) -> BotvisorResult<Self> {
        let path = lock_path(registry_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BotvisorError::registry_io(&path, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| BotvisorError::registry_io(&path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() != fs2::lock_contended_error().kind() {
                return Err(BotvisorError::registry_io(&path, e));
            }

            let mut holder = String::new();
            let _ = file.read_to_string(&mut holder);
            return Err(BotvisorError::RegistryLocked {
                path: registry_path.to_path_buf(),
                holder: holder.trim().parse().ok(),
            });
        }

        file.set_len(0)
            .and_then(|_| file.write_all(std::process::id().to_string().as_bytes()))
            .and_then(|_| file.flush())
            .map_err(|e| BotvisorError::registry_io(&path, e))?;

        tracing::debug!("locked registry with {}", path.display());
        Ok(Self { file, path })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("failed to release {}: {}", self.path.display(), e);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn lock_path(registry_path: &Path) -> PathBuf {
    let mut file_name = registry_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    file_name.push(".lock");
    registry_path.with_file_name(file_name)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
