//! Utility functions for working with environment variables.

use std::path::PathBuf;

use crate::DEFAULT_BOTVISOR_HOME;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable for the botvisor home directory
pub const BOTVISOR_HOME_ENV_VAR: &str = "BOTVISOR_HOME";

/// Environment variable holding the server API key
pub const BOTVISOR_API_KEY_ENV_VAR: &str = "BOTVISOR_API_KEY";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path to the botvisor home directory.
/// If the BOTVISOR_HOME environment variable is set, returns that path.
/// Otherwise, returns the default botvisor home path.
pub fn get_botvisor_home_path() -> PathBuf {
    if let Ok(botvisor_home) = std::env::var(BOTVISOR_HOME_ENV_VAR) {
        PathBuf::from(botvisor_home)
    } else {
        DEFAULT_BOTVISOR_HOME.to_owned()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
