//! Address collection
//!
//! Turns a neighbor table dump into the set of addresses that may be
//! published this run, grouped by hardware address.

use crate::config::DdnsConfig;
use crate::traits::{AddressLookup, MacAddress, NeighborEntry, NeighborState};
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use tracing::{debug, info, warn};

/// Whether an address is globally routable enough to publish
///
/// Rejects unspecified (`::`), loopback (`::1`), multicast (`ff00::/8`),
/// link-local (`fe80::/10`) and unique-local (`fc00::/7`) addresses.
pub fn is_publishable(address: &Ipv6Addr) -> bool {
    !address.is_unspecified()
        && !address.is_loopback()
        && !address.is_multicast()
        && !address.is_unicast_link_local()
        && !address.is_unique_local()
}

/// Whether a neighbor entry is a confirmed-live address of a tracked host
///
/// Only `Reachable` counts: stale and probing entries are unconfirmed, and a
/// failed entry means the last probe got no answer.
pub fn is_live(entry: &NeighborEntry, config: &DdnsConfig) -> bool {
    entry.state == NeighborState::Reachable
        && is_publishable(&entry.address)
        && entry
            .hardware_address
            .is_some_and(|mac| config.tracks(&mac))
}

/// Live addresses grouped by hardware address
///
/// Rebuilt from scratch every run. Each group keeps first-seen order without
/// duplicates; [`AddressGroups::live_addresses`] flattens every group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressGroups {
    groups: BTreeMap<MacAddress, Vec<Ipv6Addr>>,
    live: Vec<Ipv6Addr>,
}

impl AddressGroups {
    /// Create empty groups
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `address` as live for `host`
    ///
    /// Returns `false` if the host already had this address.
    pub fn insert(&mut self, host: MacAddress, address: Ipv6Addr) -> bool {
        let group = self.groups.entry(host).or_default();
        if group.contains(&address) {
            return false;
        }
        group.push(address);

        if !self.live.contains(&address) {
            self.live.push(address);
        }
        true
    }

    /// Live addresses of `host`, empty if none
    pub fn addresses_for(&self, host: &MacAddress) -> &[Ipv6Addr] {
        self.groups.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every address seen live this run, across all hosts
    pub fn live_addresses(&self) -> &[Ipv6Addr] {
        &self.live
    }

    /// Whether no host has a live address
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Group the live entries of a neighbor table dump
///
/// Entries carrying the self sentinel are skipped; the host's own address
/// comes from [`add_self_address`].
pub fn collect_reachable(entries: &[NeighborEntry], config: &DdnsConfig) -> AddressGroups {
    let mut groups = AddressGroups::new();

    for entry in entries.iter().filter(|e| is_live(e, config)) {
        let Some(mac) = entry.hardware_address else {
            continue;
        };
        if mac.is_self_sentinel() {
            continue;
        }
        if groups.insert(mac, entry.address) {
            debug!("Live neighbor {} at {}", mac, entry.address);
        }
    }

    groups
}

/// Add this host's own address to the self sentinel group
///
/// Does nothing unless the configuration tracks the sentinel. The lookup is
/// called exactly once; any failure leaves the group empty for this run.
pub async fn add_self_address(
    groups: &mut AddressGroups,
    config: &DdnsConfig,
    lookup: Option<&dyn AddressLookup>,
) {
    if !config.tracks_self() {
        return;
    }

    let Some(lookup) = lookup else {
        warn!(
            "{} is tracked but no address lookup is available, skipping self address",
            MacAddress::SELF_SENTINEL
        );
        return;
    };

    match lookup.lookup().await {
        Ok(address) if is_publishable(&address) => {
            info!("Self address: {}", address);
            groups.insert(MacAddress::SELF_SENTINEL, address);
        }
        Ok(address) => {
            warn!("Self address {} is not globally routable, skipping", address);
        }
        Err(e) => {
            warn!("Self address lookup failed, publishing none this run: {}", e);
        }
    }
}
