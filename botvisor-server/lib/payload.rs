//! Request and response payload definitions for the botvisor server.

use std::fmt;

use botvisor_core::registry::UnitSummary;
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types: Requests
//--------------------------------------------------------------------------------------------------

/// Request payload for creating a unit
#[derive(Deserialize)]
pub struct CreateUnitRequest {
    /// Unit name
    pub name: String,

    /// Credential written into the unit's configuration
    pub credential: String,
}

//--------------------------------------------------------------------------------------------------
// Types: Responses
//--------------------------------------------------------------------------------------------------

/// Response type for regular message responses
#[derive(Debug, Serialize, Deserialize)]
pub struct RegularMessageResponse {
    /// Message describing the outcome
    pub message: String,
}

/// Response for a created unit
#[derive(Debug, Serialize)]
pub struct UnitCreatedResponse {
    /// Message describing the outcome
    pub message: String,

    /// The new unit
    pub unit: UnitSummary,
}

/// Response for a started unit
#[derive(Debug, Serialize)]
pub struct UnitStartedResponse {
    /// Message describing the outcome
    pub message: String,

    /// Process id of the unit
    pub pid: u32,
}

/// Unit listing response
#[derive(Debug, Serialize)]
pub struct UnitListResponse {
    /// Every unit, ordered by name
    pub units: Vec<UnitSummary>,
}

/// Response for operations that stop several units
#[derive(Debug, Serialize, Deserialize)]
pub struct UnitsStoppedResponse {
    /// Message describing the outcome
    pub message: String,

    /// Names of the units that were stopped
    pub stopped: Vec<String>,
}

/// Body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind
    pub error: String,

    /// Human-readable description
    pub message: String,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for CreateUnitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUnitRequest")
            .field("name", &self.name)
            .field("credential", &"<redacted>")
            .finish()
    }
}
