// # Neighbor Table Trait
//
// Defines the interface to the OS IPv6 neighbor cache.
//
// ## Implementations
//
// - Netlink (Linux): `neighdns-neigh-netlink` crate
//
// ## Usage
//
// ```rust,ignore
// use neighdns_core::NeighborTable;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let table = /* NeighborTable implementation */;
//
//     for entry in table.list().await? {
//         println!("{} via {:?} is {:?}", entry.address, entry.hardware_address, entry.state);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Hardware (link-layer) address
///
/// Always displayed in lowercase colon-separated form, which is the
/// canonical text used as the configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Reserved address standing for "this host itself"
    ///
    /// Addresses for the sentinel come from the external address lookup,
    /// never from the neighbor table.
    pub const SELF_SENTINEL: Self = Self([0; 6]);

    /// Create from raw bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create from a link-layer attribute of arbitrary length
    ///
    /// Returns `None` unless the slice is exactly 6 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Check if this is the self sentinel
    #[inline]
    pub fn is_self_sentinel(&self) -> bool {
        *self == Self::SELF_SENTINEL
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = crate::Error;

    /// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated), any letter case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::config(format!("Invalid hardware address: '{}'", s));

        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(invalid());
            }
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Kernel neighbor reachability state (NUD_* values from linux/neighbour.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborState {
    /// Resolution in progress
    Incomplete,
    /// Confirmed reachable
    Reachable,
    /// Reachability no longer confirmed
    Stale,
    /// Waiting before probing
    Delay,
    /// Probe in progress
    Probe,
    /// Resolution failed, presumed dead
    Failed,
    /// No resolution needed
    NoArp,
    /// Static entry
    Permanent,
    /// Anything else
    Unknown,
}

impl NeighborState {
    /// Create from kernel NUD_* value
    pub fn from_kernel(state: u16) -> Self {
        match state {
            0x01 => Self::Incomplete,
            0x02 => Self::Reachable,
            0x04 => Self::Stale,
            0x08 => Self::Delay,
            0x10 => Self::Probe,
            0x20 => Self::Failed,
            0x40 => Self::NoArp,
            0x80 => Self::Permanent,
            _ => Self::Unknown,
        }
    }

    /// Whether an active probe could change what we know about this entry
    ///
    /// Reachable entries are already confirmed and failed entries are
    /// already known dead; everything in between is worth probing.
    #[inline]
    pub fn needs_probe(&self) -> bool {
        !matches!(self, Self::Reachable | Self::Failed)
    }
}

/// One IPv6 neighbor table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    /// Link-layer address, absent for unresolved entries
    pub hardware_address: Option<MacAddress>,
    /// Neighbor IPv6 address
    pub address: Ipv6Addr,
    /// Reachability state
    pub state: NeighborState,
    /// Interface index the entry lives on
    pub link_index: u32,
}

impl NeighborEntry {
    /// Create a new neighbor entry
    pub fn new(
        hardware_address: Option<MacAddress>,
        address: Ipv6Addr,
        state: NeighborState,
        link_index: u32,
    ) -> Self {
        Self {
            hardware_address,
            address,
            state,
            link_index,
        }
    }
}

/// Trait for neighbor table implementations
///
/// The family is fixed to IPv6.
///
/// # Trust Level: Semi-Trusted
///
/// Implementations perform platform-specific I/O (Netlink) and nothing else:
/// they never decide which entries to probe or publish, and never retry.
/// A failed call returns an error; the engine decides whether it is fatal.
#[async_trait]
pub trait NeighborTable: Send + Sync {
    /// Dump every IPv6 neighbor entry on every interface
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<NeighborEntry>)`: The current table
    /// - `Err(Error)`: If the table could not be read
    async fn list(&self) -> Result<Vec<NeighborEntry>, crate::Error>;

    /// Force an entry into the probe state
    ///
    /// This makes the kernel send a unicast neighbor solicitation; the entry
    /// then resolves to reachable or failed on its own.
    ///
    /// # Parameters
    ///
    /// - `link_index`: Interface index of the entry
    /// - `address`: Neighbor IPv6 address
    async fn set_probe_state(&self, link_index: u32, address: Ipv6Addr)
    -> Result<(), crate::Error>;
}
