//! `botvisor-utils` is a library containing general utilities for the botvisor project.

#![warn(missing_docs)]

pub mod defaults;
pub mod env;
pub mod path;
pub mod term;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use env::*;
pub use path::*;
pub use term::*;
