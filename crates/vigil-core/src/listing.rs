//! Listing types — the tracked entity of the Vigil store.
//!
//! A listing is identified externally by its natural key `(source,
//! source_id)` and internally by a storage-assigned rowid. Its lifecycle is
//! an explicit state machine: status only ever moves forward, and every
//! mutation site goes through [`ListingStatus::can_transition_to`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

// ─── Status state machine ────────────────────────────────────────────────────

/// Lifecycle status of an active-table listing.
///
/// Legal transitions: new→active, new→closed, active→expired,
/// active→closed. Self-transitions are permitted no-ops (a re-observed
/// active listing is re-marked active on every sync pass). Everything else
/// is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
  New,
  Active,
  Expired,
  Closed,
}

impl ListingStatus {
  /// Whether moving from `self` to `next` is a legal forward transition.
  pub fn can_transition_to(self, next: ListingStatus) -> bool {
    use ListingStatus::*;
    self == next
      || matches!(
        (self, next),
        (New, Active) | (New, Closed) | (Active, Expired) | (Active, Closed)
      )
  }

  /// Validate a transition, returning the target status on success.
  pub fn transition_to(self, next: ListingStatus) -> Result<ListingStatus> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::IllegalTransition { from: self, to: next })
    }
  }

  /// The string stored in the `status` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::New => "new",
      Self::Active => "active",
      Self::Expired => "expired",
      Self::Closed => "closed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "new" => Ok(Self::New),
      "active" => Ok(Self::Active),
      "expired" => Ok(Self::Expired),
      "closed" => Ok(Self::Closed),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

// ─── Close reason ────────────────────────────────────────────────────────────

/// Why a listing left the active table. Recorded on the archive row only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
  /// Deadline passed before the listing disappeared from the source.
  Expired,
  /// The listing vanished from a complete scrape of its scope.
  Closed,
  /// The detail page stopped resolving.
  NotFound,
  /// Superseded by another listing for the same underlying entity.
  Duplicate,
}

impl CloseReason {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Expired => "expired",
      Self::Closed => "closed",
      Self::NotFound => "not_found",
      Self::Duplicate => "duplicate",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "expired" => Ok(Self::Expired),
      "closed" => Ok(Self::Closed),
      "not_found" => Ok(Self::NotFound),
      "duplicate" => Ok(Self::Duplicate),
      other => Err(Error::UnknownCloseReason(other.to_owned())),
    }
  }
}

// ─── Search scope ────────────────────────────────────────────────────────────

/// The query segment a scrape pass covers (one job-title/location search, or
/// one geographic/category segment). Reconciliation only ever compares a
/// batch against persisted rows of the same scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchScope {
  pub query:    String,
  pub location: String,
}

impl SearchScope {
  pub fn new(query: impl Into<String>, location: impl Into<String>) -> Self {
    Self { query: query.into(), location: location.into() }
  }
}

// ─── Scraped input ───────────────────────────────────────────────────────────

/// One listing as produced by a scraper collaborator, before any storage
/// resolution. `source_id` accepts either a JSON string or an integer and is
/// coerced to a string either way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedListing {
  #[serde(alias = "id", deserialize_with = "coerce_source_id")]
  pub source_id:    String,
  #[serde(default)]
  pub url:          Option<String>,
  #[serde(default)]
  pub title:        Option<String>,
  #[serde(default)]
  pub company:      Option<String>,
  #[serde(default)]
  pub location:     Option<String>,
  #[serde(default)]
  pub description:  Vec<String>,
  #[serde(default)]
  pub price:        Option<f64>,
  #[serde(default)]
  pub price_m2:     Option<f64>,
  #[serde(default)]
  pub deadline:     Option<NaiveDate>,
  #[serde(default)]
  pub skills:       Vec<String>,
  #[serde(default)]
  pub requirements: Vec<String>,
  #[serde(default)]
  pub benefits:     Vec<String>,
  #[serde(default)]
  pub scraped_at:   Option<DateTime<Utc>>,
}

impl ScrapedListing {
  /// Minimal constructor used in tests and fixtures.
  pub fn with_source_id(source_id: impl Into<String>) -> Self {
    Self { source_id: source_id.into(), ..Self::default() }
  }
}

/// Accept `"12345"` or `12345` for the natural key.
fn coerce_source_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Text(String),
    Number(i64),
  }

  Ok(match Raw::deserialize(deserializer)? {
    Raw::Text(s) => s,
    Raw::Number(n) => n.to_string(),
  })
}

// ─── New listing input ───────────────────────────────────────────────────────

/// Input to [`crate::store::ListingStore::create_listing`]: scraped fields
/// with reference entities already resolved to ids. `first_seen_at` and the
/// initial `new` status are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewListing {
  pub source:          String,
  pub source_id:       String,
  pub scope:           SearchScope,
  pub url:             Option<String>,
  pub title:           Option<String>,
  pub company_id:      Option<i64>,
  pub location:        Option<String>,
  pub description:     Vec<String>,
  pub price:           Option<f64>,
  pub price_m2:        Option<f64>,
  pub deadline:        Option<NaiveDate>,
  pub skill_ids:       Vec<i64>,
  pub requirement_ids: Vec<i64>,
  pub benefit_ids:     Vec<i64>,
}

// ─── Persisted listing ───────────────────────────────────────────────────────

/// A row of the active table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
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
  pub status:        ListingStatus,
  pub first_seen_at: DateTime<Utc>,
  pub last_seen_at:  DateTime<Utc>,
}

// ─── Price history ───────────────────────────────────────────────────────────

/// One append-only price observation, keyed by natural key so the log
/// survives archival of the listing itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
  pub source:      String,
  pub source_id:   String,
  pub price:       Option<f64>,
  pub price_m2:    Option<f64>,
  pub recorded_at: DateTime<Utc>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
