//! Configuration of the botvisor server.
//!
//! The server listens on the loopback interface only. Outside development mode every mutating
//! request must carry the API key as a bearer token.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use getset::Getters;

use crate::{BotvisorServerError, BotvisorServerResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The address the server binds to.
pub const LOCALHOST_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Server settings.
#[derive(Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Config {
    /// API key required on mutating routes
    key: Option<String>,

    /// Whether to run the server in development mode
    dev_mode: bool,

    /// Address to listen on
    addr: SocketAddr,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Config {
    /// Create a new configuration
    pub fn new(key: Option<String>, port: u16, dev_mode: bool) -> BotvisorServerResult<Self> {
        let key = match key.filter(|k| !k.trim().is_empty()) {
            Some(k) => Some(k),
            None if dev_mode => None,
            None => {
                return Err(BotvisorServerError::ConfigError(
                    "no key provided; a key is required when not in dev mode".to_string(),
                ));
            }
        };

        Ok(Self {
            key,
            dev_mode,
            addr: SocketAddr::new(LOCALHOST_IP, port),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("dev_mode", &self.dev_mode)
            .field("addr", &self.addr)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
