//! The `ListingStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `vigil-store-sqlite`).
//! Higher layers (`BatchLoader`, the CLI) depend on this abstraction, not on
//! any concrete backend.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  listing::{
    CloseReason, Listing, ListingStatus, NewListing, PricePoint,
    ScrapedListing, SearchScope,
  },
  reconcile::SyncOutcome,
  reference::{ReferenceEntity, ReferenceKind},
};

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Aggregate counts consumed by reporting collaborators. The
/// `by_status` shape (label → count) is a contract reporting code depends
/// on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
  pub active_listings:   i64,
  pub archived_listings: i64,
  pub companies:         i64,
  pub skills:            i64,
  pub requirements:      i64,
  pub benefits:          i64,
  pub by_status:         BTreeMap<String, i64>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Vigil listing store backend.
///
/// Every write method is a single transaction: it runs to completion or
/// rolls back with no partial state visible. The store is safe to share
/// across tasks, but two concurrent [`sync_batch`](Self::sync_batch) calls
/// for the same `(source, scope)` are a caller contract violation (both
/// could classify the same key as closed and double-archive it).
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait ListingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reference upsert ──────────────────────────────────────────────────

  /// Insert-or-bump a company by normalized name. Blank input is a no-op
  /// returning `Ok(None)`; repeated sightings increment `count` and
  /// refresh `last_seen`.
  fn get_or_create_company<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  /// Same contract as [`get_or_create_company`](Self::get_or_create_company),
  /// with an optional category recorded on first sighting.
  fn get_or_create_skill<'a>(
    &'a self,
    name: &'a str,
    category: Option<&'a str>,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  fn get_or_create_requirement<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  fn get_or_create_benefit<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  /// The most-observed reference entities of one kind, by count descending.
  fn top_references(
    &self,
    kind: ReferenceKind,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ReferenceEntity>, Self::Error>> + Send + '_;

  // ── Listings ──────────────────────────────────────────────────────────

  /// Insert a listing (status `new`, `first_seen_at` = now) together with
  /// its relation links, in one transaction. Returns the assigned id.
  fn create_listing(
    &self,
    input: NewListing,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  fn get_listing(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Listing>, Self::Error>> + Send + '_;

  /// Whether a row with this natural key exists in the active table.
  fn listing_exists<'a>(
    &'a self,
    source: &'a str,
    source_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn listings_by_status(
    &self,
    status: ListingStatus,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Listing>, Self::Error>> + Send + '_;

  /// Reference entities linked to a listing (its skills, requirements, or
  /// benefits).
  fn listing_references(
    &self,
    id: i64,
    kind: ReferenceKind,
  ) -> impl Future<Output = Result<Vec<ReferenceEntity>, Self::Error>> + Send + '_;

  /// Move a listing's status along the state machine, refreshing
  /// `last_seen_at`. Illegal transitions are rejected.
  fn update_status(
    &self,
    id: i64,
    status: ListingStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reconciliation ────────────────────────────────────────────────────

  /// Reconcile one COMPLETE scrape batch for `(source, scope)` against the
  /// persisted active set: refresh the still-present, archive the vanished
  /// (reason `closed`), and return the not-yet-persisted listings for the
  /// caller to create.
  ///
  /// The whole pass is one transaction. Do not pass a partial or failed
  /// scrape: every persisted key missing from `found` WILL be archived,
  /// including all of them when `found` is empty.
  fn sync_batch<'a>(
    &'a self,
    source: &'a str,
    scope: &'a SearchScope,
    found: &'a [ScrapedListing],
  ) -> impl Future<Output = Result<SyncOutcome, Self::Error>> + Send + 'a;

  // ── Archival ──────────────────────────────────────────────────────────

  /// Archive one listing: insert the archive copy (with `archived_at`,
  /// `close_reason`, derived `lifetime_days`), delete its relation rows and
  /// its active row, atomically. Returns `false` (benign no-op) if the id
  /// no longer exists — already archived by an overlapping sweep.
  fn archive_listing(
    &self,
    id: i64,
    reason: CloseReason,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Archive (reason `expired`) every active listing whose deadline is
  /// strictly before today. Best-effort: individual failures are logged
  /// and skipped. Returns the number archived; zero matches is `Ok(0)`.
  fn expire_by_deadline(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Fetch the archived copy of a listing, if any.
  fn get_archived(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<crate::archive::ArchivedListing>, Self::Error>>
  + Send
  + '_;

  // ── Price history ─────────────────────────────────────────────────────

  /// If `price`/`price_m2` differ from the stored values, append the OLD
  /// values to the price log and update the listing, returning `true`.
  /// Unchanged prices write nothing and return `false`.
  fn record_price(
    &self,
    id: i64,
    price: Option<f64>,
    price_m2: Option<f64>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// The append-only price log for a natural key, oldest first. Survives
  /// archival of the listing.
  fn price_history<'a>(
    &'a self,
    source: &'a str,
    source_id: &'a str,
  ) -> impl Future<Output = Result<Vec<PricePoint>, Self::Error>> + Send + 'a;

  // ── Statistics ────────────────────────────────────────────────────────

  fn stats(
    &self,
  ) -> impl Future<Output = Result<StoreStats, Self::Error>> + Send + '_;
}
