//! Desired state
//!
//! Cross-references the configured bindings with this run's live addresses.
//! Pure: no I/O, no clock.

use crate::config::DdnsConfig;
use crate::engine::collector::AddressGroups;
use std::net::Ipv6Addr;

/// What one fully-qualified name should resolve to after this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    /// Fully-qualified record name
    pub fqdn: String,
    /// Configured label under the zone apex
    pub label: String,
    /// Annotation written after the ownership tag
    pub annotation: String,
    /// Addresses to publish, possibly none
    pub addresses: Vec<Ipv6Addr>,
}

/// Build the desired record set, one entry per distinct name
///
/// Every configured binding yields an entry, including those whose host has
/// no live address (an empty list means "publish nothing"). Bindings that
/// resolve to the same name, whether on one host or on several, are merged:
/// addresses are united in first-seen order and the first binding's
/// annotation is kept.
pub fn build_desired(config: &DdnsConfig, groups: &AddressGroups) -> Vec<DesiredRecord> {
    let mut desired: Vec<DesiredRecord> = Vec::new();

    for (host, bindings) in &config.record_map {
        let addresses = groups.addresses_for(host);

        for binding in bindings {
            let fqdn = config.fqdn(&binding.name);

            match desired.iter_mut().find(|d| d.fqdn.eq_ignore_ascii_case(&fqdn)) {
                Some(existing) => {
                    for addr in addresses {
                        if !existing.addresses.contains(addr) {
                            existing.addresses.push(*addr);
                        }
                    }
                }
                None => desired.push(DesiredRecord {
                    fqdn,
                    label: binding.name.clone(),
                    annotation: binding.comment.clone(),
                    addresses: addresses.to_vec(),
                }),
            }
        }
    }

    desired
}
