// # Address Lookup Trait
//
// Defines the interface for learning this host's own public IPv6 address
// from an external service. The neighbor table never lists the host's own
// addresses, so bindings on the self sentinel are fed from here.
//
// ## Implementations
//
// - HTTP: `neighdns-ip-http` crate

use async_trait::async_trait;
use std::net::Ipv6Addr;

/// Trait for self-address lookup implementations
///
/// # Trust Level: Untrusted
///
/// Lookups are single-shot: one request per call, no retry, no caching.
/// Errors are reported to the engine, which logs them and publishes no self
/// address for the run.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    /// Fetch this host's public IPv6 address
    ///
    /// # Returns
    ///
    /// - `Ok(Ipv6Addr)`: The address reported by the service
    /// - `Err(Error)`: Transport failure, or an empty or garbled response
    async fn lookup(&self) -> Result<Ipv6Addr, crate::Error>;
}
