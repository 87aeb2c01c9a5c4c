//! Platform process primitives used to address and terminate unit processes.

mod process;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use process::*;
