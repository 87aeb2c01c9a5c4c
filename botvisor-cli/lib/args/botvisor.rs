use std::path::PathBuf;

use botvisor_utils::DEFAULT_SERVER_PORT;
use clap::{Parser, Subcommand};

use crate::styles;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Supervise a fleet of bots running on this machine
#[derive(Debug, Parser)]
#[command(name = "botvisor", author, styles=styles::styles())]
pub struct BotvisorArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<BotvisorSubcommand>,

    /// Home directory holding the registry, the template and the units
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Show version
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Show logs with trace level
    #[arg(long, global = true)]
    pub trace: bool,

    /// Show logs with debug level
    #[arg(long, global = true)]
    pub debug: bool,

    /// Show logs with info level
    #[arg(long, global = true)]
    pub info: bool,

    /// Show logs with warn level
    #[arg(long, global = true)]
    pub warn: bool,

    /// Show logs with error level
    #[arg(long, global = true)]
    pub error: bool,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum BotvisorSubcommand {
    /// Run the HTTP API in the foreground
    #[command(name = "serve")]
    Serve {
        /// Port number to listen on
        #[arg(long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,

        /// API key required on mutating requests, defaults to `BOTVISOR_API_KEY`
        #[arg(short = 'k', long)]
        key: Option<String>,

        /// Run in development mode, where no key is required
        #[arg(long = "dev", default_value_t = false)]
        dev_mode: bool,
    },

    /// Create a unit from the template
    #[command(name = "create")]
    Create {
        /// Name of the unit
        name: String,

        /// Credential written into the unit's configuration
        credential: String,
    },

    /// Start a unit
    #[command(name = "start")]
    Start {
        /// Name of the unit
        name: String,
    },

    /// Stop a unit
    #[command(name = "stop")]
    Stop {
        /// Name of the unit
        name: String,
    },

    /// Stop every running unit
    #[command(name = "stop-all")]
    StopAll,

    /// List units and their state
    #[command(name = "list")]
    List,

    /// Mark units whose process is gone as stopped
    #[command(name = "reconcile")]
    Reconcile,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
