use std::{fmt, path::PathBuf};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a botvisor-related operation.
pub type BotvisorResult<T> = Result<T, BotvisorError>;

/// An error that occurred during a supervisor operation.
#[derive(pretty_error_debug::Debug, Error)]
pub enum BotvisorError {
    /// The unit is not in the registry.
    #[error("unit '{0}' does not exist")]
    NotFound(String),

    /// A unit with the same name is already registered or being provisioned.
    #[error("unit '{0}' already exists")]
    DuplicateName(String),

    /// The unit is already running or starting.
    #[error("unit '{0}' is already running")]
    AlreadyRunning(String),

    /// The unit is not running.
    #[error("unit '{0}' is not running")]
    NotRunning(String),

    /// The unit's working directory has no dependency manifest.
    #[error("dependency manifest is missing: {0}")]
    MissingManifest(PathBuf),

    /// The dependency installation exited unsuccessfully.
    #[error(
        "dependency installation for unit '{name}' failed with exit code {}; see the supervisor output for details",
        display_exit_code(.exit_code)
    )]
    DependencyInstall {
        /// The unit being started.
        name: String,

        /// The installer's exit code, `None` if it was terminated by a signal.
        exit_code: Option<i32>,
    },

    /// The dependency installation did not finish in time.
    #[error(
        "dependency installation for unit '{name}' timed out after {seconds}s; see the supervisor output for details"
    )]
    DependencyInstallTimeout {
        /// The unit being started.
        name: String,

        /// The timeout that was exceeded.
        seconds: u64,
    },

    /// A child process could not be spawned.
    #[error("failed to launch '{program}': {source}; see the supervisor output for details")]
    LauncherSpawn {
        /// The program that could not be spawned.
        program: String,

        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The unit process exited before the startup grace period elapsed.
    #[error(
        "unit '{name}' exited during startup with exit code {}; see the supervisor output for details",
        display_exit_code(.exit_code)
    )]
    UnitExitedEarly {
        /// The unit being started.
        name: String,

        /// The process exit code, `None` if it was terminated by a signal.
        exit_code: Option<i32>,
    },

    /// No credential was supplied for a new unit.
    #[error("a credential is required to create unit '{0}'")]
    MissingCredential(String),

    /// The unit name cannot be used as a directory name.
    #[error("invalid unit name '{0}': use ASCII letters, digits, '-' or '_' and do not start with '-'")]
    InvalidUnitName(String),

    /// A stage of provisioning failed.
    #[error("failed to provision unit '{name}' during {stage}: {message}")]
    Provisioning {
        /// The unit being provisioned.
        name: String,

        /// The stage that failed.
        stage: ProvisioningStage,

        /// What went wrong.
        message: String,
    },

    /// The registry document could not be read or written.
    #[error("registry error at {path}: {source}")]
    RegistryIo {
        /// The registry document.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Another supervisor holds the registry.
    #[error(
        "registry {} is in use by another botvisor process{}; stop it or send the request to the running server",
        .path.display(),
        display_holder(.holder)
    )]
    RegistryLocked {
        /// The registry document.
        path: PathBuf,

        /// The pid of the holder, if it could be read.
        holder: Option<u32>,
    },

    /// A unit's process could not be signalled.
    #[error("failed to terminate unit '{name}': {message}")]
    Termination {
        /// The unit being stopped.
        name: String,

        /// What went wrong.
        message: String,
    },

    /// The caller is not allowed to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The supervisor configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background supervisor task failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// An I/O operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The stages of provisioning a new unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStage {
    /// Copying the template tree.
    Copy,

    /// Seeding the scaffold subdirectory.
    Scaffold,

    /// Reading the unit configuration document.
    ConfigRead,

    /// Writing the unit configuration document.
    ConfigWrite,

    /// Moving the staged unit into place.
    Commit,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BotvisorError {
    /// Creates a provisioning error for the given stage.
    pub fn provisioning(
        name: impl Into<String>,
        stage: ProvisioningStage,
        message: impl fmt::Display,
    ) -> Self {
        BotvisorError::Provisioning {
            name: name.into(),
            stage,
            message: message.to_string(),
        }
    }

    /// Creates a registry error for the given document.
    pub fn registry_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BotvisorError::RegistryIo {
            path: path.into(),
            source,
        }
    }

    /// A short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BotvisorError::NotFound(_) => "not_found",
            BotvisorError::DuplicateName(_) => "duplicate_name",
            BotvisorError::AlreadyRunning(_) => "already_running",
            BotvisorError::NotRunning(_) => "not_running",
            BotvisorError::MissingManifest(_) => "missing_manifest",
            BotvisorError::DependencyInstall { .. } => "dependency_install",
            BotvisorError::DependencyInstallTimeout { .. } => "dependency_install_timeout",
            BotvisorError::LauncherSpawn { .. } => "launcher_spawn",
            BotvisorError::UnitExitedEarly { .. } => "unit_exited_early",
            BotvisorError::MissingCredential(_) => "missing_credential",
            BotvisorError::InvalidUnitName(_) => "invalid_unit_name",
            BotvisorError::Provisioning { .. } => "provisioning",
            BotvisorError::RegistryIo { .. } => "registry_io",
            BotvisorError::RegistryLocked { .. } => "registry_locked",
            BotvisorError::Termination { .. } => "termination",
            BotvisorError::Unauthorized(_) => "unauthorized",
            BotvisorError::Config(_) => "config",
            BotvisorError::Internal(_) => "internal",
            BotvisorError::Io(_) => "io",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            ProvisioningStage::Copy => "copy",
            ProvisioningStage::Scaffold => "scaffold",
            ProvisioningStage::ConfigRead => "config-read",
            ProvisioningStage::ConfigWrite => "config-write",
            ProvisioningStage::Commit => "commit",
        };

        f.write_str(stage)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn display_exit_code(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

fn display_holder(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!(" (pid {})", pid),
        None => String::new(),
    }
}
