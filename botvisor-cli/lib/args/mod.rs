//! Command line arguments.

mod botvisor;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use botvisor::*;
