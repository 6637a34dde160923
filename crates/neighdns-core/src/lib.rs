// # neighdns-core
//
// Core library for publishing live IPv6 neighbors as AAAA records.
//
// ## Architecture Overview
//
// This library provides the reconciliation logic; everything that touches
// the OS or the network sits behind a trait:
// - **NeighborTable**: Trait for reading and probing the IPv6 neighbor cache
// - **AddressLookup**: Trait for learning this host's own public address
// - **DnsProvider**: Trait for listing owned records and submitting batches
// - **ReconcileEngine**: Runs one probe → collect → diff → submit pass
//
// ## Design Principles
//
// 1. **Separation of Concerns**: The diff is a pure function; I/O lives in trait implementations
// 2. **Run-Scoped State**: Nothing is persisted, every run rediscovers the world
// 3. **Ownership Tags**: Only records carrying this deployment's tag are ever mutated
// 4. **Library-First**: All core functionality can be used as a library

pub mod traits;
pub mod engine;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{
    AddressLookup, BatchOutcome, ChangeBatch, DnsProvider, MacAddress, NeighborEntry,
    NeighborState, NeighborTable, RecordSpec, RecordUpdate, RemoteRecord,
};
pub use engine::{EngineEvent, ReconcileEngine, RunReport};
pub use config::{DdnsConfig, ProviderCredentials, RecordBinding};
pub use error::{Error, Result};
