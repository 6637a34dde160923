//! Error types for the neighdns system
//!
//! Every failure a run can hit is one variant of [`Error`]. Whether a run
//! aborts on it is decided by [`Error::is_fatal`]: probe and address lookup
//! failures are logged and skipped, everything else ends the run.

use std::net::Ipv6Addr;
use thiserror::Error;

/// Result type alias for neighdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the neighdns system
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, unreadable or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Neighbor table could not be queried
    #[error("Neighbor table error: {0}")]
    NeighborTable(String),

    /// Active probe could not be issued for an address
    #[error("Probe of {address} failed: {message}")]
    Probe {
        /// Address whose neighbor entry was being probed
        address: Ipv6Addr,
        /// Reason reported by the OS
        message: String,
    },

    /// External lookup of this host's own address failed
    #[error("Address lookup error: {0}")]
    AddressLookup(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a neighbor table error
    pub fn neighbor_table(msg: impl Into<String>) -> Self {
        Self::NeighborTable(msg.into())
    }

    /// Create a probe error
    pub fn probe(address: Ipv6Addr, message: impl Into<String>) -> Self {
        Self::Probe {
            address,
            message: message.into(),
        }
    }

    /// Create an address lookup error
    pub fn address_lookup(msg: impl Into<String>) -> Self {
        Self::AddressLookup(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the run
    ///
    /// Probe and address lookup failures only shrink the set of addresses
    /// published this run; every other error leaves the run without ground
    /// truth or without a trustworthy remote view.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Probe { .. } | Self::AddressLookup(_))
    }

    /// Whether this error is a configuration problem
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
