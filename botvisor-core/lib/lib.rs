//! `botvisor` supervises a fleet of bot processes running on the local machine.
//!
//! # Overview
//!
//! Every managed bot is a *unit*: a directory created from a template, holding a dependency
//! manifest, an entry point and a configuration document carrying the unit's credential. The
//! supervisor keeps a durable registry of units, installs dependencies, launches each unit as its
//! own process group and stops units individually or all at once.
//!
//! # Key Features
//!
//! - **Durable Registry**: A JSON document rewritten atomically after every change
//! - **Tracked Processes**: Each unit's process id is recorded and its exit observed
//! - **Group Termination**: Graceful stop with escalation to a hard kill
//! - **Transactional Provisioning**: New units are staged and moved into place in one step
//!
//! # Modules
//!
//! - [`config`] - Supervisor settings and their defaults
//! - [`management`] - Unit lifecycle, launching, termination and provisioning
//! - [`registry`] - Unit records and their durable storage
//! - [`runtime`] - Platform process primitives

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod config;
pub mod management;
pub mod registry;
pub mod runtime;

pub use error::*;
