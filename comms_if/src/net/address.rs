//! # Addresses
//!
//! The driver station knows the robot by an ordered pool of `host:port` addresses (for example the
//! robot's wifi and ethernet interfaces). Connections are attempted in pool order, advancing to the
//! next address after every failure and wrapping at the end.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use std::{
    convert::TryFrom,
    fmt,
    io,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A host and port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    pub host: String,
    pub port: u16
}

/// A fixed, ordered, non-empty pool of addresses with a cursor.
#[derive(Debug, Clone)]
pub struct AddressPool {
    addrs: Vec<Address>,
    cursor: usize
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("Address {0:?} does not have a port, expected host:port")]
    MissingPort(String),

    #[error("Address {0:?} has an invalid port")]
    InvalidPort(String),

    #[error("Address {0:?} has an empty host")]
    EmptyHost(String),

    #[error("An address pool needs at least one address")]
    EmptyPool
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Address {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port
        }
    }

    /// The same host on a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }

    /// The ZMQ TCP endpoint for this address, e.g. `tcp://192.168.4.1:5555`.
    pub fn tcp_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host_for_url(), self.port)
    }

    /// Resolve the address into socket addresses.
    pub fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|a| a.collect())
    }

    fn host_for_url(&self) -> String {
        match self.host.contains(':') {
            true => format!("[{}]", self.host),
            false => self.host.clone()
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_for_url(), self.port)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (host, port) = s.rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;

        let port = port.parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(s.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::EmptyHost(s.to_string()))
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_string()
    }
}

impl From<SocketAddr> for Address {
    fn from(a: SocketAddr) -> Self {
        Self::new(a.ip().to_string(), a.port())
    }
}

impl AddressPool {
    /// Create a new pool with the cursor at the first address.
    pub fn new(addrs: Vec<Address>) -> Result<Self, AddressError> {
        if addrs.is_empty() {
            return Err(AddressError::EmptyPool)
        }

        Ok(Self {
            addrs,
            cursor: 0
        })
    }

    /// The address under the cursor.
    pub fn current(&self) -> &Address {
        &self.addrs[self.cursor]
    }

    /// Move the cursor on to the next address, wrapping at the end of the pool, and return it.
    pub fn advance(&mut self) -> &Address {
        self.cursor = (self.cursor + 1) % self.addrs.len();
        self.current()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn addrs(&self) -> &[Address] {
        &self.addrs
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
