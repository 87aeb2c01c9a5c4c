//! The durable registry of managed units.
//!
//! The registry maps unit names to [`UnitRecord`]s. It is loaded once at startup and rewritten in
//! full after every mutation through a [`RegistryStore`]. A [`RegistryLock`] keeps a second
//! supervisor from rewriting the same document.

mod lock;
mod record;
mod store;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use lock::*;
pub use record::*;
pub use store::*;
