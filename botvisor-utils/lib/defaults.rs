//! Default names and locations shared by the botvisor crates.

use std::{path::PathBuf, sync::LazyLock};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory under the user's home where botvisor keeps its state.
pub const BOTVISOR_HOME_DIR: &str = ".botvisor";

/// The default botvisor home path.
pub static DEFAULT_BOTVISOR_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(BOTVISOR_HOME_DIR)
});

/// The file name of the durable unit registry.
pub const REGISTRY_FILENAME: &str = "managed_bots.json";

/// The file name of the optional supervisor configuration file.
pub const BOTVISOR_CONFIG_FILENAME: &str = "botvisor.yaml";

/// The subdirectory of the home directory that holds one directory per unit.
pub const UNITS_SUBDIR: &str = "bots";

/// The subdirectory of the home directory holding the unit template.
pub const TEMPLATE_SUBDIR: &str = "template";

/// The entry point file of a unit.
pub const DEFAULT_ENTRY_FILENAME: &str = "index.js";

/// The dependency manifest that must exist before a unit can be launched.
pub const DEFAULT_MANIFEST_FILENAME: &str = "package.json";

/// The per-unit configuration document that receives the credential.
pub const DEFAULT_UNIT_CONFIG_FILENAME: &str = "config.json";

/// The scaffold subdirectory seeded inside every new unit.
pub const DEFAULT_SCAFFOLD_SUBDIR: &str = "bots";

/// The key under which the credential is stored in the unit configuration document.
pub const DEFAULT_CREDENTIAL_KEY: &str = "token";

/// Prefix of the staging directories used while provisioning a unit.
pub const STAGING_DIR_PREFIX: &str = ".staging-";

/// The default port the supervisor server listens on.
pub const DEFAULT_SERVER_PORT: u16 = 5557;
