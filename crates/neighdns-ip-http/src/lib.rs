// # HTTP Address Lookup
//
// This crate provides an HTTP-based `AddressLookup` for neighdns.
//
// ## Purpose
//
// The host running neighdns never appears in its own neighbor table. When
// the configuration binds names to the self sentinel `00:00:00:00:00:00`,
// this lookup asks an external "what is my IP" service for the host's
// public IPv6 address instead.
//
// ## Behavior
//
// - One GET per run, no retry, no caching
// - Browser-like `User-Agent` (some services block obvious bots)
// - 10 second timeout
// - Body trimmed and parsed as an IPv6 address; anything else is an error
//
// The collector logs lookup errors and publishes no self address for the
// run, so a flaky service never fails the whole reconciliation.

use async_trait::async_trait;
use neighdns_core::config::DdnsConfig;
use neighdns_core::traits::AddressLookup;
use neighdns_core::{Error, Result};
use std::net::Ipv6Addr;
use std::time::Duration;

/// User-Agent sent with every lookup
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Lookup request timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP lookup of this host's public IPv6 address
#[derive(Debug)]
pub struct HttpAddressLookup {
    /// URL returning the caller's address as plain text
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpAddressLookup {
    /// Create a new HTTP address lookup
    ///
    /// # Parameters
    ///
    /// - `url`: URL to fetch the address from (e.g., "https://api-ipv6.ip.sb/ip")
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into().trim().to_string();
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(Error::config(format!(
                "Address lookup URL must use HTTP or HTTPS scheme. Got: {}",
                url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }

    /// Build the lookup the configuration asks for, if any
    ///
    /// Returns `Ok(None)` when the self sentinel is not tracked.
    pub fn from_config(config: &DdnsConfig) -> Result<Option<Self>> {
        if !config.tracks_self() {
            return Ok(None);
        }

        match config.local_ipv6_addr_api_url.as_deref() {
            Some(url) => Self::new(url).map(Some),
            None => Err(Error::config("localIpv6AddrApiUrl is not set")),
        }
    }

    /// The URL this lookup queries
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AddressLookup for HttpAddressLookup {
    async fn lookup(&self) -> Result<Ipv6Addr> {
        tracing::debug!("Looking up self address via {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::address_lookup(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::address_lookup(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::address_lookup(format!("Failed to read response: {}", e)))?;

        parse_address(&body)
    }
}

/// Parse a lookup response body
fn parse_address(body: &str) -> Result<Ipv6Addr> {
    let text = body.trim();
    if text.is_empty() {
        return Err(Error::address_lookup("Empty response body"));
    }

    text.parse()
        .map_err(|_| Error::address_lookup(format!("Not an IPv6 address: '{}'", text)))
}
