//! Pure reconciliation: classify a freshly scraped key set against the
//! persisted active key set.
//!
//! The classification is plain set algebra, kept out of the storage layer so
//! the partition property can be checked without a database. The store
//! drives the side effects (refresh, archive) from the result.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::listing::ScrapedListing;

/// The three-way split of `found ∪ persisted`.
///
/// The sets are disjoint and together cover every key seen on either side:
/// `new ∪ existing = found`, `existing ∪ closed = persisted`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
  /// In the batch, not in the store — to be created by the caller.
  pub new:      BTreeSet<String>,
  /// On both sides — still live, refresh `last_seen_at`.
  pub existing: BTreeSet<String>,
  /// In the store, missing from the batch — to be archived.
  pub closed:   BTreeSet<String>,
}

/// Classify `found` against `persisted`.
///
/// Precondition (caller contract, not checked here): `found` is the COMPLETE
/// result set of one successful scrape pass for the scope. A truncated or
/// failed scrape passed in here will classify still-live listings as closed
/// and archive them. An empty `found` against a populated scope closes
/// everything — intentional, the source really returned zero results.
pub fn classify(found: &BTreeSet<String>, persisted: &BTreeSet<String>) -> Classification {
  Classification {
    new:      found.difference(persisted).cloned().collect(),
    existing: found.intersection(persisted).cloned().collect(),
    closed:   persisted.difference(found).cloned().collect(),
  }
}

/// Collect the natural keys of a scraped batch.
pub fn found_keys(found: &[ScrapedListing]) -> BTreeSet<String> {
  found.iter().map(|listing| listing.source_id.clone()).collect()
}

// ─── Sync outcome ────────────────────────────────────────────────────────────

/// What one `sync_batch` call did, returned to the pipeline orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
  /// Listings whose key was not yet persisted; the reconciler classifies
  /// only — creating these is the caller's job (see `BatchLoader`).
  pub new:      Vec<ScrapedListing>,
  /// Count of still-live listings whose `last_seen_at` was refreshed.
  pub existing: usize,
  /// Count of vanished listings archived with reason `closed`.
  pub closed:   usize,
}
