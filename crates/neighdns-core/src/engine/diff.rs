//! Diff engine
//!
//! Compares the desired record set against the records the provider holds
//! and produces the smallest [`ChangeBatch`] that makes them agree.
//!
//! ## Passes
//!
//! For every desired name:
//!
//! 1. **Exact match**: a remote record already pointing at a live address is
//!    satisfied and left alone.
//! 2. **Repair**: each address still unmatched rewrites the first same-name
//!    record that is neither satisfied nor claimed (an update, which claims
//!    the record), or becomes a create when no such record is left.
//! 3. **Same-name cleanup**: unless the name needed a create this run, when
//!    the number of same-name records differs from the number of addresses,
//!    every unsatisfied same-name record is deleted.
//!
//! Then, over all owned records:
//!
//! 4. **Orphan sweep**: records whose name is no longer configured, and
//!    unclaimed records whose content is not live anywhere, are deleted.
//!
//! ## Tie-break
//!
//! When several same-name records could be repaired, the first one in the
//! provider's listing order wins. Providers do not promise a stable order,
//! so which record id ends up holding which address may differ between
//! runs; the name still converges to exactly the live addresses.

use crate::engine::desired::DesiredRecord;
use crate::traits::{ChangeBatch, RecordSpec, RecordUpdate, RemoteRecord};
use std::collections::HashSet;
use std::net::Ipv6Addr;

/// TTL written on every managed record, in seconds
pub const RECORD_TTL: u32 = 60;

/// Comment written on every managed record
///
/// Starts with the ownership tag so the record is found again by the
/// provider's comment-prefix filter on the next run.
pub fn record_comment(ownership_tag: &str, annotation: &str) -> String {
    format!("{}  {}", ownership_tag, annotation)
}

/// Plan the changes that make the owned remote records match `desired`
///
/// Remote records that are not AAAA or do not carry `ownership_tag` are
/// dropped before planning and can never appear in the batch. `live` is the
/// flattened list of every address seen live this run.
///
/// Total over well-formed input: never fails, never panics.
pub fn plan_changes(
    desired: &[DesiredRecord],
    remote: &[RemoteRecord],
    live: &[Ipv6Addr],
    ownership_tag: &str,
) -> ChangeBatch {
    let owned = owned_records(remote, ownership_tag);
    let mut batch = ChangeBatch::new();
    let mut claimed: HashSet<&str> = HashSet::new();

    for record in desired {
        let same_name: Vec<&RemoteRecord> = owned
            .iter()
            .copied()
            .filter(|r| r.has_name(&record.fqdn))
            .collect();
        let mut satisfied: HashSet<&str> = HashSet::new();

        let unmatched: Vec<Ipv6Addr> = record
            .addresses
            .iter()
            .copied()
            .filter(|addr| {
                let hit = same_name
                    .iter()
                    .find(|r| !satisfied.contains(r.id.as_str()) && r.points_at(addr));
                match hit {
                    Some(r) => {
                        satisfied.insert(r.id.as_str());
                        false
                    }
                    None => true,
                }
            })
            .collect();

        let mut created = false;
        for addr in unmatched {
            let spec = RecordSpec {
                name: record.fqdn.clone(),
                content: addr,
                comment: record_comment(ownership_tag, &record.annotation),
                ttl: RECORD_TTL,
                proxied: false,
            };

            let target = same_name.iter().find(|r| {
                !satisfied.contains(r.id.as_str()) && !claimed.contains(r.id.as_str())
            });
            match target {
                Some(r) => {
                    satisfied.insert(r.id.as_str());
                    claimed.insert(r.id.as_str());
                    batch.updates.push(RecordUpdate {
                        id: r.id.clone(),
                        record: spec,
                    });
                }
                None => {
                    batch.creates.push(spec);
                    created = true;
                }
            }
        }

        // Freshly created records are not in the listing yet; leave the
        // name alone until the next run sees them.
        if created || same_name.len() == record.addresses.len() {
            continue;
        }

        for r in &same_name {
            if !satisfied.contains(r.id.as_str()) && !claimed.contains(r.id.as_str()) {
                schedule_delete(&mut batch, &r.id);
            }
        }
    }

    for r in &owned {
        if claimed.contains(r.id.as_str()) {
            continue;
        }

        let configured = desired.iter().any(|d| r.has_name(&d.fqdn));
        let live_anywhere = live.iter().any(|addr| r.points_at(addr));
        if !configured || !live_anywhere {
            schedule_delete(&mut batch, &r.id);
        }
    }

    batch
}

/// Owned AAAA records, first occurrence of each id, in listing order
fn owned_records<'a>(remote: &'a [RemoteRecord], ownership_tag: &str) -> Vec<&'a RemoteRecord> {
    let mut seen: HashSet<&str> = HashSet::new();
    remote
        .iter()
        .filter(|r| r.is_aaaa() && r.is_owned_by(ownership_tag))
        .filter(|r| seen.insert(r.id.as_str()))
        .collect()
}

fn schedule_delete(batch: &mut ChangeBatch, id: &str) {
    if !batch.deletes_id(id) && !batch.updates_id(id) {
        batch.deletes.push(id.to_string());
    }
}
