//! Core reconciliation engine
//!
//! The ReconcileEngine runs one pass that:
//! - Probes stale neighbors of tracked hosts
//! - Collects the addresses confirmed live
//! - Builds the desired record set from the configured bindings
//! - Diffs it against the owned remote records
//! - Submits the resulting batch, if any
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ NeighborTable │────▶│ prober       │────▶│ collector    │◀── AddressLookup
//! └───────────────┘     └──────────────┘     └──────────────┘
//!                                                   │ AddressGroups
//!                                                   ▼
//! ┌───────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ DnsProvider   │────▶│ diff         │◀────│ desired      │
//! │ (list)        │     └──────────────┘     └──────────────┘
//! └───────────────┘            │ ChangeBatch
//!                              ▼
//!                       ┌──────────────┐
//!                       │ DnsProvider  │
//!                       │ (submit)     │
//!                       └──────────────┘
//! ```
//!
//! ## Failure Policy
//!
//! Reading the neighbor table, listing records and submitting the batch are
//! fatal: the run stops and the error is returned. Probe and self-address
//! failures are logged and the run continues. Nothing is retried; the next
//! scheduled invocation is the retry.

pub mod collector;
pub mod desired;
pub mod diff;
pub mod prober;

use crate::config::DdnsConfig;
use crate::error::Result;
use crate::traits::{AddressLookup, BatchOutcome, ChangeBatch, DnsProvider, NeighborTable};
use collector::AddressGroups;
use prober::{ProbeOutcome, SETTLE_DELAY};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub use collector::{collect_reachable, is_publishable};
pub use desired::{build_desired, DesiredRecord};
pub use diff::{plan_changes, record_comment, RECORD_TTL};

/// Capacity of the engine event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Run started
    Started {
        hosts_count: usize,
    },

    /// Stale neighbors were probed
    Probed {
        issued: usize,
        failed: usize,
    },

    /// Live addresses were collected
    Collected {
        live_count: usize,
    },

    /// A change batch was planned
    Planned {
        deletes: usize,
        updates: usize,
        creates: usize,
    },

    /// The batch was handed to the provider
    Submitted {
        outcome: BatchOutcome,
    },

    /// Remote state already matched, nothing submitted
    UpToDate,
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Probing pass results
    pub probes: ProbeOutcome,
    /// Live addresses per host
    pub groups: AddressGroups,
    /// Zone the batch applied to
    pub zone_id: String,
    /// The planned batch, possibly empty
    pub batch: ChangeBatch,
    /// Submission result, `None` when the batch was empty
    pub outcome: Option<BatchOutcome>,
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Call [`ReconcileEngine::run()`] once per scheduled invocation
/// 3. Drop
///
/// ## Threading
///
/// A run is strictly sequential. The only suspension point that is not an
/// external call is the settle delay after probing.
pub struct ReconcileEngine {
    /// Immutable configuration, threaded into every step
    config: DdnsConfig,

    /// OS neighbor cache
    neighbors: Box<dyn NeighborTable>,

    /// Self-address lookup, if one is configured
    lookup: Option<Box<dyn AddressLookup>>,

    /// DNS provider for listing and submitting
    provider: Box<dyn DnsProvider>,

    /// Wait after probing before re-reading the table
    settle_delay: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new reconciliation engine
    ///
    /// # Parameters
    ///
    /// - `config`: Validated deployment configuration
    /// - `neighbors`: Neighbor table implementation
    /// - `lookup`: Self-address lookup, required only when the self sentinel is tracked
    /// - `provider`: DNS provider implementation
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        config: DdnsConfig,
        neighbors: Box<dyn NeighborTable>,
        lookup: Option<Box<dyn AddressLookup>>,
        provider: Box<dyn DnsProvider>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            config,
            neighbors,
            lookup,
            provider,
            settle_delay: SETTLE_DELAY,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Override the settle delay after probing
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Run one reconciliation pass
    ///
    /// # Returns
    ///
    /// - `Ok(RunReport)`: Remote state now matches (or, in dry-run mode, would match)
    /// - `Err(Error)`: Fatal error; no local recovery was attempted
    pub async fn run(&self) -> Result<RunReport> {
        self.emit_event(EngineEvent::Started {
            hosts_count: self.config.record_map.len(),
        });

        let (probes, groups) = self.discover().await?;

        let desired = build_desired(&self.config, &groups);
        for record in &desired {
            debug!("Desired {} -> {:?}", record.fqdn, record.addresses);
        }

        let zone_id = self.resolve_zone().await?;
        let tag = self.config.ownership_tag();
        let remote = self.provider.list_records(&zone_id, &tag).await?;
        debug!("{} record(s) listed with tag {}", remote.len(), tag);

        let batch = plan_changes(&desired, &remote, groups.live_addresses(), &tag);
        info!(
            "Planned {} delete(s), {} update(s), {} create(s)",
            batch.deletes.len(),
            batch.updates.len(),
            batch.creates.len()
        );
        self.emit_event(EngineEvent::Planned {
            deletes: batch.deletes.len(),
            updates: batch.updates.len(),
            creates: batch.creates.len(),
        });

        if batch.is_empty() {
            info!("Records already up to date, nothing to do");
            self.emit_event(EngineEvent::UpToDate);
            return Ok(RunReport {
                probes,
                groups,
                zone_id,
                batch,
                outcome: None,
            });
        }

        match serde_json::to_string(&batch) {
            Ok(json) => debug!("Batch: {}", json),
            Err(e) => debug!("Batch not printable: {}", e),
        }

        let outcome = self.provider.submit_batch(&zone_id, &batch).await?;
        match outcome {
            BatchOutcome::Applied { operations } => {
                info!("{} applied {} operation(s)", self.provider.provider_name(), operations)
            }
            BatchOutcome::DryRun { operations } => {
                info!("Dry run: {} operation(s) not submitted", operations)
            }
        }
        self.emit_event(EngineEvent::Submitted { outcome });

        Ok(RunReport {
            probes,
            groups,
            zone_id,
            batch,
            outcome: Some(outcome),
        })
    }

    /// Probe, re-read and collect the live addresses of tracked hosts
    async fn discover(&self) -> Result<(ProbeOutcome, AddressGroups)> {
        let mut entries = self.neighbors.list().await?;
        debug!("{} neighbor entries read", entries.len());

        let probes = prober::probe_stale_neighbors(
            self.neighbors.as_ref(),
            &self.config,
            &entries,
            self.settle_delay,
        )
        .await;
        self.emit_event(EngineEvent::Probed {
            issued: probes.issued,
            failed: probes.failed,
        });

        if probes.any_issued() {
            entries = self.neighbors.list().await?;
            debug!("{} neighbor entries read after probing", entries.len());
        }

        let mut groups = collect_reachable(&entries, &self.config);
        collector::add_self_address(&mut groups, &self.config, self.lookup.as_deref()).await;

        for (host, bindings) in &self.config.record_map {
            let names: Vec<String> = bindings.iter().map(|b| self.config.fqdn(&b.name)).collect();
            let addresses = groups.addresses_for(host);
            if addresses.is_empty() {
                info!("{} ({}): no live address", host, names.join(", "));
            } else {
                info!("{} ({}): {:?}", host, names.join(", "), addresses);
            }
        }
        self.emit_event(EngineEvent::Collected {
            live_count: groups.live_addresses().len(),
        });

        Ok((probes, groups))
    }

    /// Use the configured zone id, or ask the provider for it
    async fn resolve_zone(&self) -> Result<String> {
        if let Some(zone_id) = self.config.zone_id.as_deref().filter(|z| !z.trim().is_empty()) {
            return Ok(zone_id.trim().to_string());
        }

        let zone_id = self.provider.zone_id(&self.config.domain_name).await?;
        debug!("Zone {} has id {}", self.config.domain_name, zone_id);
        Ok(zone_id)
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            debug!("Event channel full or closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_equality() {
        let event = EngineEvent::Planned {
            deletes: 1,
            updates: 0,
            creates: 2,
        };

        assert_eq!(event.clone(), event);
        assert_ne!(event, EngineEvent::UpToDate);
    }
}
