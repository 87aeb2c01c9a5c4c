//! Management of units.
//!
//! [`Supervisor`] is the entry point. It wires the [`Lifecycle`] state machine to the
//! [`Launcher`], the [`Terminator`] and the [`Provisioner`], which do the actual work on processes
//! and directories.

mod launcher;
mod lifecycle;
mod provisioner;
mod supervisor;
mod terminator;

#[cfg(test)]
pub(crate) mod testing;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use launcher::*;
pub use lifecycle::*;
pub use provisioner::*;
pub use supervisor::*;
pub use terminator::*;
