//! Liveness probing
//!
//! A tracked host that went quiet sits in the stale state until something
//! talks to it. Forcing those entries into the probe state makes the kernel
//! send a neighbor solicitation; after [`SETTLE_DELAY`] the entry is either
//! reachable again or failed, and the next table dump tells us which.

use crate::config::DdnsConfig;
use crate::engine::collector::is_publishable;
use crate::traits::{NeighborEntry, NeighborTable};
use std::time::Duration;
use tracing::{info, warn};

/// How long probed entries get to resolve before the table is read again
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// What a probing pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Probes the OS accepted
    pub issued: usize,
    /// Probes the OS refused
    pub failed: usize,
}

impl ProbeOutcome {
    /// Whether the neighbor table is worth reading again
    pub fn any_issued(&self) -> bool {
        self.issued > 0
    }
}

/// Whether an entry is an unconfirmed address of a tracked host
pub fn needs_probing(entry: &NeighborEntry, config: &DdnsConfig) -> bool {
    let Some(mac) = entry.hardware_address else {
        return false;
    };

    !mac.is_self_sentinel()
        && config.tracks(&mac)
        && entry.state.needs_probe()
        && is_publishable(&entry.address)
}

/// Probe every stale entry of a tracked host, then wait for them to settle
///
/// A refused probe is logged and skipped. The wait only happens when at
/// least one probe was accepted.
pub async fn probe_stale_neighbors(
    table: &dyn NeighborTable,
    config: &DdnsConfig,
    entries: &[NeighborEntry],
    settle_delay: Duration,
) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();

    for entry in entries.iter().filter(|e| needs_probing(e, config)) {
        match table.set_probe_state(entry.link_index, entry.address).await {
            Ok(()) => {
                info!("{} is {:?}, neighbor probe issued", entry.address, entry.state);
                outcome.issued += 1;
            }
            Err(e) => {
                warn!(
                    "Failed to probe {}: {} (probing needs CAP_NET_ADMIN, run as root)",
                    entry.address, e
                );
                outcome.failed += 1;
            }
        }
    }

    if outcome.any_issued() {
        info!(
            "Waiting {:?} for {} probed neighbor(s) to settle",
            settle_delay, outcome.issued
        );
        tokio::time::sleep(settle_delay).await;
    }

    outcome
}
