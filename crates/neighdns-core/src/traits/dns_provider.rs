// # DNS Provider Trait
//
// Defines the interface for reading and batch-mutating AAAA records via a
// provider API.
//
// ## Implementations
//
// - Cloudflare: `neighdns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use neighdns_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let zone_id = provider.zone_id("example.com").await?;
//     let records = provider.list_records(&zone_id, "DDNS-router1").await?;
//     println!("{} owned records", records.len());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::Serialize;
use std::net::Ipv6Addr;

/// The only record type this system manages
pub const RECORD_TYPE: &str = "AAAA";

/// An existing record at the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    /// Provider-assigned record id
    pub id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record type (e.g. "AAAA")
    pub record_type: String,
    /// Record content, the address text for AAAA records
    pub content: String,
    /// Comment field, carrying the ownership tag on owned records
    pub comment: Option<String>,
}

impl RemoteRecord {
    /// Create a new AAAA remote record
    pub fn aaaa(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            record_type: RECORD_TYPE.to_string(),
            content: content.into(),
            comment,
        }
    }

    /// Whether this record's comment carries the ownership tag
    ///
    /// The tag must be the whole comment or be followed by whitespace, so
    /// `DDNS-router10  x` is not owned by `DDNS-router1`.
    pub fn is_owned_by(&self, ownership_tag: &str) -> bool {
        self.comment.as_deref().is_some_and(|c| {
            c.strip_prefix(ownership_tag)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        })
    }

    /// Whether this record is an AAAA record
    pub fn is_aaaa(&self) -> bool {
        self.record_type.eq_ignore_ascii_case(RECORD_TYPE)
    }

    /// Whether the record currently points at `address`
    ///
    /// Content is compared as an address when it parses, so equivalent
    /// spellings (`2001:db8::1` vs `2001:0db8:0:0:0:0:0:1`) match.
    pub fn points_at(&self, address: &Ipv6Addr) -> bool {
        match self.content.trim().parse::<Ipv6Addr>() {
            Ok(content) => content == *address,
            Err(_) => self.content == address.to_string(),
        }
    }

    /// Whether the record's name equals `fqdn` (DNS names are case-insensitive)
    pub fn has_name(&self, fqdn: &str) -> bool {
        self.name.eq_ignore_ascii_case(fqdn)
    }
}

/// Full content of a record to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSpec {
    /// Fully-qualified record name
    pub name: String,
    /// Address to publish
    pub content: Ipv6Addr,
    /// Comment, starting with the ownership tag
    pub comment: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Whether the provider should proxy traffic for the record
    pub proxied: bool,
}

/// Replacement of an existing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordUpdate {
    /// Provider-assigned id of the record being rewritten
    pub id: String,
    /// New record content
    #[serde(flatten)]
    pub record: RecordSpec,
}

/// A single operation of a batch, in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation<'a> {
    /// Delete the record with this id
    Delete(&'a str),
    /// Rewrite an existing record
    Update(&'a RecordUpdate),
    /// Create a new record
    Create(&'a RecordSpec),
}

/// The atomic unit of remote mutation
///
/// Built fresh each run by the diff engine, submitted once, then discarded.
/// An id appears in at most one of `deletes` and `updates`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeBatch {
    /// Ids of records to delete
    pub deletes: Vec<String>,
    /// Records to rewrite in place
    pub updates: Vec<RecordUpdate>,
    /// Records to create
    pub creates: Vec<RecordSpec>,
}

impl ChangeBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the batch contains no operation at all
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.creates.is_empty()
    }

    /// Total number of operations
    pub fn len(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.creates.len()
    }

    /// Whether `id` is already scheduled for deletion
    pub fn deletes_id(&self, id: &str) -> bool {
        self.deletes.iter().any(|d| d == id)
    }

    /// Whether `id` is already scheduled for an update
    pub fn updates_id(&self, id: &str) -> bool {
        self.updates.iter().any(|u| u.id == id)
    }

    /// All operations in submission order: deletes, then updates, then creates
    ///
    /// Deletions go first so a name freed by a delete can be reused by an
    /// update or create within the same batch.
    pub fn operations(&self) -> impl Iterator<Item = BatchOperation<'_>> {
        self.deletes
            .iter()
            .map(|id| BatchOperation::Delete(id.as_str()))
            .chain(self.updates.iter().map(BatchOperation::Update))
            .chain(self.creates.iter().map(BatchOperation::Create))
    }
}

/// Result of a batch submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The provider applied the whole batch
    Applied {
        /// Number of operations submitted
        operations: usize,
    },
    /// Dry-run mode: the batch was logged, nothing was sent
    DryRun {
        /// Number of operations that would have been submitted
        operations: usize,
    },
}

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (a failed run is retried by the next invocation)
/// - ❌ Decide which records to change (owned by the diff engine)
/// - ❌ Touch records outside the ones named in the batch
/// - ❌ Cache state beyond a single call
///
/// ## Atomicity
///
/// `submit_batch` must hand the whole batch to the provider in one request.
/// The engine performs no local recovery after a failure and relies on the
/// provider applying the batch all-or-nothing.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Resolve the provider's zone id for a zone name
    ///
    /// # Parameters
    ///
    /// - `zone_name`: The zone apex, e.g. "example.com"
    async fn zone_id(&self, zone_name: &str) -> Result<String, crate::Error>;

    /// List the AAAA records whose comment starts with `comment_prefix`
    ///
    /// Records are returned in provider listing order.
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Zone to list
    /// - `comment_prefix`: Ownership tag records must carry
    async fn list_records(
        &self,
        zone_id: &str,
        comment_prefix: &str,
    ) -> Result<Vec<RemoteRecord>, crate::Error>;

    /// Submit a batch as one atomic request
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Zone the batch applies to
    /// - `batch`: Non-empty change batch
    async fn submit_batch(
        &self,
        zone_id: &str,
        batch: &ChangeBatch,
    ) -> Result<BatchOutcome, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
