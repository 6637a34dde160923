//! Core traits for the neighdns system
//!
//! This module defines the abstract interfaces to everything outside the
//! process.
//!
//! - [`NeighborTable`]: Read and probe the OS IPv6 neighbor cache
//! - [`AddressLookup`]: Learn this host's own public IPv6 address
//! - [`DnsProvider`]: List owned records and submit change batches

pub mod neighbor_table;
pub mod address_lookup;
pub mod dns_provider;

pub use neighbor_table::{NeighborTable, NeighborEntry, NeighborState, MacAddress};
pub use address_lookup::AddressLookup;
pub use dns_provider::{
    DnsProvider, RemoteRecord, RecordSpec, RecordUpdate, ChangeBatch, BatchOperation,
    BatchOutcome, RECORD_TYPE,
};
