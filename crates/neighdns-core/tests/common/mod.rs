//! Test doubles and common utilities for reconciliation contract tests
//!
//! The fakes are cheap to clone and share their state through `Arc`s, so a
//! test keeps one handle for assertions and boxes a clone into the engine.

#![allow(dead_code)]

use neighdns_core::config::{DdnsConfig, RecordBinding};
use neighdns_core::error::{Error, Result};
use neighdns_core::ReconcileEngine;
use neighdns_core::traits::{
    AddressLookup, BatchOperation, BatchOutcome, ChangeBatch, DnsProvider, MacAddress,
    NeighborEntry, NeighborState, NeighborTable, RemoteRecord,
};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TOKEN: &str = "router1";
pub const TAG: &str = "DDNS-router1";
pub const ZONE: &str = "example.com";
pub const ZONE_ID: &str = "zone-123";
pub const HOST: &str = "aa:bb:cc:dd:ee:ff";
pub const OTHER_HOST: &str = "11:22:33:44:55:66";

pub fn mac(s: &str) -> MacAddress {
    s.parse().unwrap()
}

pub fn addr(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

pub fn neighbor(host: &str, address: &str, state: NeighborState) -> NeighborEntry {
    NeighborEntry::new(Some(mac(host)), addr(address), state, 2)
}

/// An AAAA record carrying this deployment's tag
pub fn owned_record(id: &str, label: &str, content: &str) -> RemoteRecord {
    RemoteRecord::aaaa(
        id,
        format!("{}.{}", label, ZONE),
        content,
        Some(format!("{}  ", TAG)),
    )
}

/// An AAAA record some other party manages
pub fn foreign_record(id: &str, label: &str, content: &str, comment: Option<&str>) -> RemoteRecord {
    RemoteRecord::aaaa(
        id,
        format!("{}.{}", label, ZONE),
        content,
        comment.map(str::to_string),
    )
}

/// Configuration tracking [`HOST`] as `virt1`
pub fn minimal_config() -> DdnsConfig {
    DdnsConfig::new(TOKEN, ZONE)
        .with_api_token("test-token")
        .with_binding(mac(HOST), RecordBinding::new("virt1", ""))
}

/// Build an engine over clones of the fakes, dropping the event receiver
pub fn engine(
    config: DdnsConfig,
    table: &FakeNeighborTable,
    lookup: Option<&FakeAddressLookup>,
    provider: &ModelProvider,
) -> ReconcileEngine {
    let lookup = lookup.map(|l| Box::new(l.clone()) as Box<dyn AddressLookup>);
    let (engine, _event_rx) =
        ReconcileEngine::new(config, Box::new(table.clone()), lookup, Box::new(provider.clone()))
            .expect("engine construction succeeds");
    engine
}

/// A neighbor table that answers differently before and after probing
#[derive(Clone)]
pub struct FakeNeighborTable {
    before: Arc<Vec<NeighborEntry>>,
    after: Arc<Option<Vec<NeighborEntry>>>,
    list_calls: Arc<AtomicUsize>,
    probes: Arc<Mutex<Vec<(u32, Ipv6Addr)>>>,
    fail_list: bool,
    fail_probes: bool,
}

impl FakeNeighborTable {
    /// A table that never changes
    pub fn new(entries: Vec<NeighborEntry>) -> Self {
        Self {
            before: Arc::new(entries),
            after: Arc::new(None),
            list_calls: Arc::new(AtomicUsize::new(0)),
            probes: Arc::new(Mutex::new(Vec::new())),
            fail_list: false,
            fail_probes: false,
        }
    }

    /// A table whose second and later reads return `after`
    pub fn with_after_probe(mut self, after: Vec<NeighborEntry>) -> Self {
        self.after = Arc::new(Some(after));
        self
    }

    /// Make every `list` call fail
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Make every probe fail, as without CAP_NET_ADMIN
    pub fn failing_probes(mut self) -> Self {
        self.fail_probes = true;
        self
    }

    /// Get the number of times list() was called
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Addresses probes were requested for, in order
    pub fn probed(&self) -> Vec<Ipv6Addr> {
        self.probes.lock().unwrap().iter().map(|(_, a)| *a).collect()
    }
}

#[async_trait::async_trait]
impl NeighborTable for FakeNeighborTable {
    async fn list(&self) -> Result<Vec<NeighborEntry>> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(Error::neighbor_table("netlink dump refused"));
        }

        match (call, self.after.as_ref()) {
            (0, _) | (_, None) => Ok(self.before.as_ref().clone()),
            (_, Some(after)) => Ok(after.clone()),
        }
    }

    async fn set_probe_state(&self, link_index: u32, address: Ipv6Addr) -> Result<()> {
        self.probes.lock().unwrap().push((link_index, address));
        if self.fail_probes {
            return Err(Error::probe(address, "Operation not permitted (os error 1)"));
        }
        Ok(())
    }
}

/// An address lookup with a fixed answer
#[derive(Clone)]
pub struct FakeAddressLookup {
    answer: Option<Ipv6Addr>,
    calls: Arc<AtomicUsize>,
}

impl FakeAddressLookup {
    pub fn returning(address: &str) -> Self {
        Self {
            answer: Some(addr(address)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of times lookup() was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressLookup for FakeAddressLookup {
    async fn lookup(&self) -> Result<Ipv6Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .ok_or_else(|| Error::address_lookup("empty response body"))
    }
}

/// An in-memory provider that applies batches the way the real API does
///
/// Listing filters by type and comment prefix. Batches are applied in
/// submission order and all-or-nothing: an unknown id fails the whole batch
/// and leaves the records untouched.
#[derive(Clone)]
pub struct ModelProvider {
    records: Arc<Mutex<Vec<RemoteRecord>>>,
    applied: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicUsize>,
    zone_calls: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
    submit_calls: Arc<AtomicUsize>,
    fail_list: bool,
    fail_submit: bool,
}

impl ModelProvider {
    pub fn new(records: Vec<RemoteRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            applied: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            zone_calls: Arc::new(AtomicUsize::new(0)),
            list_calls: Arc::new(AtomicUsize::new(0)),
            submit_calls: Arc::new(AtomicUsize::new(0)),
            fail_list: false,
            fail_submit: false,
        }
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    /// Snapshot of every record, owned or not
    pub fn records(&self) -> Vec<RemoteRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Sorted addresses of the owned records named `label`
    pub fn owned_addresses(&self, label: &str) -> Vec<Ipv6Addr> {
        let fqdn = format!("{}.{}", label, ZONE);
        let mut addrs: Vec<Ipv6Addr> = self
            .records()
            .iter()
            .filter(|r| r.is_owned_by(TAG) && r.has_name(&fqdn))
            .filter_map(|r| r.content.parse().ok())
            .collect();
        addrs.sort();
        addrs
    }

    /// Applied operations as `"delete:<id>"`, `"update:<id>"`, `"create:<id>"`
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn zone_calls(&self) -> usize {
        self.zone_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Get the number of times submit_batch() was called
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsProvider for ModelProvider {
    async fn zone_id(&self, zone_name: &str) -> Result<String> {
        self.zone_calls.fetch_add(1, Ordering::SeqCst);
        if zone_name == ZONE {
            Ok(ZONE_ID.to_string())
        } else {
            Err(Error::not_found(format!("zone {}", zone_name)))
        }
    }

    async fn list_records(&self, zone_id: &str, comment_prefix: &str) -> Result<Vec<RemoteRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(zone_id, ZONE_ID);
        if self.fail_list {
            return Err(Error::http("connection reset"));
        }

        Ok(self
            .records()
            .into_iter()
            .filter(|r| {
                // Server-side `comment.startswith` is a plain prefix match
                r.is_aaaa()
                    && r.comment.as_deref().is_some_and(|c| c.starts_with(comment_prefix))
            })
            .collect())
    }

    async fn submit_batch(&self, zone_id: &str, batch: &ChangeBatch) -> Result<BatchOutcome> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(zone_id, ZONE_ID);
        if self.fail_submit {
            return Err(Error::provider("model", "batch rejected"));
        }

        let mut records = self.records();
        let mut applied = Vec::new();

        for op in batch.operations() {
            match op {
                BatchOperation::Delete(id) => {
                    let before = records.len();
                    records.retain(|r| r.id != id);
                    if records.len() == before {
                        return Err(Error::provider("model", format!("no record {}", id)));
                    }
                    applied.push(format!("delete:{}", id));
                }
                BatchOperation::Update(update) => {
                    let record = records
                        .iter_mut()
                        .find(|r| r.id == update.id)
                        .ok_or_else(|| Error::provider("model", format!("no record {}", update.id)))?;
                    record.name = update.record.name.clone();
                    record.content = update.record.content.to_string();
                    record.comment = Some(update.record.comment.clone());
                    applied.push(format!("update:{}", update.id));
                }
                BatchOperation::Create(spec) => {
                    let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                    records.push(RemoteRecord::aaaa(
                        id.clone(),
                        spec.name.clone(),
                        spec.content.to_string(),
                        Some(spec.comment.clone()),
                    ));
                    applied.push(format!("create:{}", id));
                }
            }
        }

        *self.records.lock().unwrap() = records;
        self.applied.lock().unwrap().extend(applied);

        Ok(BatchOutcome::Applied {
            operations: batch.len(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "model"
    }
}
