//! Archive records — the immutable historical copy of a closed listing.
//!
//! Archive rows are created only by the archiver and never mutated. The
//! active-side row and its relation links are deleted in the same
//! transaction that inserts the archive copy.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::listing::{CloseReason, Listing, ListingStatus, SearchScope};

/// A listing frozen at the moment of closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedListing {
  /// Same id the listing carried in the active table.
  pub id:            i64,
  pub source:        String,
  pub source_id:     String,
  pub scope:         SearchScope,
  pub url:           Option<String>,
  pub title:         Option<String>,
  pub company_id:    Option<i64>,
  pub location:      Option<String>,
  pub description:   Vec<String>,
  pub price:         Option<f64>,
  pub price_m2:      Option<f64>,
  pub deadline:      Option<NaiveDate>,
  /// Status the row held when it was archived; not a new transition.
  pub status:        ListingStatus,
  pub first_seen_at: DateTime<Utc>,
  pub last_seen_at:  DateTime<Utc>,
  pub archived_at:   DateTime<Utc>,
  pub close_reason:  CloseReason,
  pub lifetime_days: i64,
}

/// How long a listing was live, in whole days, clamped to zero.
///
/// Floor, not round: ten days and three hours is ten days.
pub fn lifetime_days(first_seen_at: DateTime<Utc>, archived_at: DateTime<Utc>) -> i64 {
  (archived_at - first_seen_at).num_days().max(0)
}

impl ArchivedListing {
  /// Freeze an active listing into its archive form.
  pub fn from_listing(
    listing: Listing,
    close_reason: CloseReason,
    archived_at: DateTime<Utc>,
  ) -> Self {
    let lifetime_days = lifetime_days(listing.first_seen_at, archived_at);
    Self {
      id: listing.id,
      source: listing.source,
      source_id: listing.source_id,
      scope: listing.scope,
      url: listing.url,
      title: listing.title,
      company_id: listing.company_id,
      location: listing.location,
      description: listing.description,
      price: listing.price,
      price_m2: listing.price_m2,
      deadline: listing.deadline,
      status: listing.status,
      first_seen_at: listing.first_seen_at,
      last_seen_at: listing.last_seen_at,
      archived_at,
      close_reason,
      lifetime_days,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone, Utc};

  use super::lifetime_days;

  #[test]
  fn lifetime_uses_floor() {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();
    let archived = t0 + Duration::days(10) + Duration::hours(3);
    assert_eq!(lifetime_days(t0, archived), 10);
  }

  #[test]
  fn lifetime_clamped_to_zero() {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();
    // Clock skew between scrape host and store host must not go negative.
    assert_eq!(lifetime_days(t0, t0 - Duration::hours(5)), 0);
    assert_eq!(lifetime_days(t0, t0), 0);
  }
}
