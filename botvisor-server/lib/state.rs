//! Application state shared by the request handlers.

use std::sync::Arc;

use botvisor_core::management::Supervisor;
use getset::Getters;

use crate::config::Config;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Application state structure
#[derive(Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AppState {
    /// The server configuration
    config: Arc<Config>,

    /// The supervisor that owns every unit
    supervisor: Arc<Supervisor>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AppState {
    /// Create a new application state instance
    pub fn new(config: Arc<Config>, supervisor: Arc<Supervisor>) -> Self {
        Self { config, supervisor }
    }
}
