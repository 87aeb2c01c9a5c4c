use botvisor_core::BotvisorError;
use botvisor_server::BotvisorServerError;
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a CLI operation.
pub type BotvisorCliResult<T> = Result<T, BotvisorCliError>;

/// An error that occurred while running a CLI command.
#[derive(pretty_error_debug::Debug, Error)]
pub enum BotvisorCliError {
    /// A supervisor operation failed.
    #[error(transparent)]
    BotvisorError(#[from] BotvisorError),

    /// The server could not be set up.
    #[error(transparent)]
    ServerError(#[from] BotvisorServerError),

    /// An I/O operation failed.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
