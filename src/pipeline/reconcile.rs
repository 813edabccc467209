//! Reconciliation of a fetched batch against the stored identities.
//!
//! Partitions a batch into listings that are new to the store and listings
//! that are already known. Pure: no I/O, the batch is never modified.

use std::collections::HashSet;

use crate::models::{IdentityPolicy, ListingKey, ListingRecord};

/// Result of reconciling one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Listings to persist, in batch order, pairwise distinct in identity
    pub new_records: Vec<ListingRecord>,
    /// Listings already stored or repeated earlier in the batch
    pub duplicate_count: usize,
    /// Listings that have no identity under the store's policy
    pub unkeyed_count: usize,
}

impl Reconciliation {
    /// Check if the batch contained anything new.
    pub fn has_new(&self) -> bool {
        !self.new_records.is_empty()
    }
}

/// Reconciler bound to one store's identity policy.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    policy: IdentityPolicy,
}

impl Reconciler {
    pub fn new(policy: IdentityPolicy) -> Self {
        Self { policy }
    }

    /// Split `batch` into new and already-known listings.
    ///
    /// The first occurrence of an identity within the batch wins; later
    /// repeats count as duplicates even if the store has never seen them.
    pub fn reconcile(&self, batch: &[ListingRecord], known: &HashSet<ListingKey>) -> Reconciliation {
        let mut seen: HashSet<ListingKey> = HashSet::with_capacity(batch.len());
        let mut outcome = Reconciliation::default();

        for record in batch {
            let Some(key) = record.identity(self.policy) else {
                outcome.unkeyed_count += 1;
                log::warn!(
                    "Listing '{}' at {} has no {} identity; skipped",
                    record.title,
                    record.job_url,
                    self.policy
                );
                continue;
            };

            if known.contains(&key) || !seen.insert(key) {
                outcome.duplicate_count += 1;
            } else {
                outcome.new_records.push(record.clone());
            }
        }

        outcome
    }
}

/// Convenience function to reconcile under `policy`.
pub fn reconcile(
    batch: &[ListingRecord],
    known: &HashSet<ListingKey>,
    policy: IdentityPolicy,
) -> Reconciliation {
    Reconciler::new(policy).reconcile(batch, known)
}
