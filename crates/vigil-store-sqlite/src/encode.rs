//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, dates are ISO 8601 (`YYYY-MM-DD`),
//! description lists are compact JSON arrays, and status/close-reason enums
//! use their wire strings from `vigil-core`.

use chrono::{DateTime, NaiveDate, Utc};
use vigil_core::{
  archive::ArchivedListing,
  listing::{CloseReason, Listing, ListingStatus, PricePoint, SearchScope},
  reference::ReferenceEntity,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse::<NaiveDate>()
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Description lists ───────────────────────────────────────────────────────

pub fn encode_description(paragraphs: &[String]) -> Result<String> {
  Ok(serde_json::to_string(paragraphs)?)
}

pub fn decode_description(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column order shared by `listings` reads.
pub const LISTING_COLUMNS: &str = "id, source, source_id, scope_query, \
   scope_location, url, title, company_id, location, description, price, \
   price_m2, deadline, status, first_seen_at, last_seen_at";

/// Raw strings read directly from a `listings` row.
pub struct RawListing {
  pub id:             i64,
  pub source:         String,
  pub source_id:      String,
  pub scope_query:    String,
  pub scope_location: String,
  pub url:            Option<String>,
  pub title:          Option<String>,
  pub company_id:     Option<i64>,
  pub location:       Option<String>,
  pub description:    String,
  pub price:          Option<f64>,
  pub price_m2:       Option<f64>,
  pub deadline:       Option<String>,
  pub status:         String,
  pub first_seen_at:  String,
  pub last_seen_at:   String,
}

impl RawListing {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      source:         row.get(1)?,
      source_id:      row.get(2)?,
      scope_query:    row.get(3)?,
      scope_location: row.get(4)?,
      url:            row.get(5)?,
      title:          row.get(6)?,
      company_id:     row.get(7)?,
      location:       row.get(8)?,
      description:    row.get(9)?,
      price:          row.get(10)?,
      price_m2:       row.get(11)?,
      deadline:       row.get(12)?,
      status:         row.get(13)?,
      first_seen_at:  row.get(14)?,
      last_seen_at:   row.get(15)?,
    })
  }

  pub fn into_listing(self) -> Result<Listing> {
    Ok(Listing {
      id:            self.id,
      source:        self.source,
      source_id:     self.source_id,
      scope:         SearchScope {
        query:    self.scope_query,
        location: self.scope_location,
      },
      url:           self.url,
      title:         self.title,
      company_id:    self.company_id,
      location:      self.location,
      description:   decode_description(&self.description)?,
      price:         self.price,
      price_m2:      self.price_m2,
      deadline:      self.deadline.as_deref().map(decode_date).transpose()?,
      status:        ListingStatus::parse(&self.status).map_err(Error::Core)?,
      first_seen_at: decode_dt(&self.first_seen_at)?,
      last_seen_at:  decode_dt(&self.last_seen_at)?,
    })
  }
}

/// Raw strings read from a `listings_archive` row: the listing columns plus
/// the three archive-only fields.
pub struct RawArchived {
  pub listing:       RawListing,
  pub archived_at:   String,
  pub close_reason:  String,
  pub lifetime_days: i64,
}

impl RawArchived {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      listing:       RawListing::from_row(row)?,
      archived_at:   row.get(16)?,
      close_reason:  row.get(17)?,
      lifetime_days: row.get(18)?,
    })
  }

  pub fn into_archived(self) -> Result<ArchivedListing> {
    let archived_at = decode_dt(&self.archived_at)?;
    let close_reason =
      CloseReason::parse(&self.close_reason).map_err(Error::Core)?;
    let lifetime_days = self.lifetime_days;
    let listing = self.listing.into_listing()?;
    Ok(ArchivedListing {
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
    })
  }
}

/// Raw strings read from one of the four reference tables. The `companies`,
/// `requirements` and `benefits` tables have no category column; reads fill
/// in `NULL` for it.
pub struct RawReference {
  pub id:         i64,
  pub name:       String,
  pub count:      i64,
  pub first_seen: String,
  pub last_seen:  String,
  pub category:   Option<String>,
}

impl RawReference {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      name:       row.get(1)?,
      count:      row.get(2)?,
      first_seen: row.get(3)?,
      last_seen:  row.get(4)?,
      category:   row.get(5)?,
    })
  }

  pub fn into_reference(self) -> Result<ReferenceEntity> {
    Ok(ReferenceEntity {
      id:         self.id,
      name:       self.name,
      count:      self.count,
      first_seen: decode_date(&self.first_seen)?,
      last_seen:  decode_date(&self.last_seen)?,
      category:   self.category,
    })
  }
}

/// Raw strings read from a `price_history` row.
pub struct RawPricePoint {
  pub source:      String,
  pub source_id:   String,
  pub price:       Option<f64>,
  pub price_m2:    Option<f64>,
  pub recorded_at: String,
}

impl RawPricePoint {
  pub fn into_point(self) -> Result<PricePoint> {
    Ok(PricePoint {
      source:      self.source,
      source_id:   self.source_id,
      price:       self.price,
      price_m2:    self.price_m2,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
