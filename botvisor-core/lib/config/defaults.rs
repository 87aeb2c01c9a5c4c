use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The program used to install a unit's dependencies.
#[cfg(not(windows))]
pub const DEFAULT_INSTALL_PROGRAM: &str = "npm";

/// The program used to install a unit's dependencies.
#[cfg(windows)]
pub const DEFAULT_INSTALL_PROGRAM: &str = "npm.cmd";

/// The arguments passed to the install program.
pub const DEFAULT_INSTALL_ARGS: [&str; 3] = ["install", "--legacy-peer-deps", "--force"];

/// The runtime that executes a unit's entry point.
pub const DEFAULT_RUN_PROGRAM: &str = "node";

/// The process name matched by the fallback platform-wide termination.
pub const DEFAULT_RUNTIME_PROCESS_NAME: &str = "node";

/// The environment variable that selects the runtime profile.
pub const DEFAULT_PROFILE_ENV_VAR: &str = "NODE_ENV";

/// The profile used while installing dependencies.
pub const DEFAULT_INSTALL_PROFILE: &str = "development";

/// The profile used while running a unit.
pub const DEFAULT_RUN_PROFILE: &str = "production";

/// The upper bound on a dependency installation.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// How long a fresh unit process must stay alive before the start is committed.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(1000);

/// How long a stop waits for the unit to exit before escalating to a hard kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(5000);

/// Capacity of the unit event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;
