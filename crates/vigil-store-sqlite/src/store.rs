//! [`SqliteStore`] — the SQLite implementation of [`ListingStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tracing::{info, warn};

use vigil_core::{
  archive::{ArchivedListing, lifetime_days},
  listing::{
    CloseReason, Listing, ListingStatus, NewListing, PricePoint,
    ScrapedListing, SearchScope,
  },
  reconcile::{self, SyncOutcome},
  reference::{ReferenceEntity, ReferenceKind, normalize},
  store::{ListingStore, StoreStats},
};

use crate::{
  Error, Result,
  encode::{
    LISTING_COLUMNS, RawArchived, RawListing, RawPricePoint, RawReference,
    encode_date, encode_description, encode_dt,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vigil listing store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All access
/// is serialized through one dedicated database thread, so the handle may
/// be shared freely; the caller-contract limits in
/// [`ListingStore::sync_batch`] still apply.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Shared select/bump/insert for the four reference tables. The check and
  /// the write run in one transaction; UNIQUE(name_normalized) backstops
  /// concurrent callers.
  async fn get_or_create_reference(
    &self,
    table: &'static str,
    name: &str,
    category: Option<&str>,
  ) -> Result<Option<i64>> {
    let Some(normalized) = normalize(name) else {
      return Ok(None);
    };
    let display  = name.trim().to_owned();
    let category = category.map(str::to_owned);
    let today    = encode_date(Utc::now().date_naive());

    let id: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
          .query_row(
            &format!("SELECT id FROM {table} WHERE name_normalized = ?1"),
            rusqlite::params![normalized],
            |r| r.get(0),
          )
          .optional()?;

        let id = match existing {
          Some(id) => {
            tx.execute(
              &format!(
                "UPDATE {table} SET count = count + 1, last_seen = ?1 WHERE id = ?2"
              ),
              rusqlite::params![today, id],
            )?;
            id
          }
          None => {
            if table == "skills" {
              tx.execute(
                "INSERT INTO skills (name, name_normalized, category, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![display, normalized, category, today],
              )?;
            } else {
              tx.execute(
                &format!(
                  "INSERT INTO {table} (name, name_normalized, first_seen, last_seen)
                   VALUES (?1, ?2, ?3, ?3)"
                ),
                rusqlite::params![display, normalized, today],
              )?;
            }
            tx.last_insert_rowid()
          }
        };

        tx.commit()?;
        Ok(id)
      })
      .await?;

    Ok(Some(id))
  }
}

/// The table backing a reference kind.
fn reference_table(kind: ReferenceKind) -> &'static str {
  match kind {
    ReferenceKind::Company => "companies",
    ReferenceKind::Skill => "skills",
    ReferenceKind::Requirement => "requirements",
    ReferenceKind::Benefit => "benefits",
  }
}

/// `id, name, count, first_seen, last_seen, category` for a reference
/// table; only `skills` has a real category column.
fn reference_columns(kind: ReferenceKind) -> &'static str {
  match kind {
    ReferenceKind::Skill => "id, name, count, first_seen, last_seen, category",
    _ => "id, name, count, first_seen, last_seen, NULL",
  }
}

/// Archive one listing inside an open transaction: copy the row (plus
/// `archived_at`, `close_reason`, derived `lifetime_days`) into
/// `listings_archive`, then delete the relation rows and the active row.
/// Returns `false` when the id is gone — already archived elsewhere.
fn archive_in_tx(
  tx: &rusqlite::Transaction<'_>,
  id: i64,
  reason: CloseReason,
  now: DateTime<Utc>,
) -> std::result::Result<bool, tokio_rusqlite::Error> {
  let raw: Option<RawListing> = tx
    .query_row(
      &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
      rusqlite::params![id],
      RawListing::from_row,
    )
    .optional()?;

  let Some(raw) = raw else {
    return Ok(false);
  };

  let first_seen_at = DateTime::parse_from_rfc3339(&raw.first_seen_at)
    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?
    .with_timezone(&Utc);
  let lifetime = lifetime_days(first_seen_at, now);

  tx.execute(
    "INSERT INTO listings_archive (
       id, source, source_id, scope_query, scope_location, url, title,
       company_id, location, description, price, price_m2, deadline,
       status, first_seen_at, last_seen_at,
       archived_at, close_reason, lifetime_days
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
               ?14, ?15, ?16, ?17, ?18, ?19)",
    rusqlite::params![
      raw.id,
      raw.source,
      raw.source_id,
      raw.scope_query,
      raw.scope_location,
      raw.url,
      raw.title,
      raw.company_id,
      raw.location,
      raw.description,
      raw.price,
      raw.price_m2,
      raw.deadline,
      raw.status,
      raw.first_seen_at,
      raw.last_seen_at,
      encode_dt(now),
      reason.as_str(),
      lifetime,
    ],
  )?;

  tx.execute("DELETE FROM listing_skills WHERE listing_id = ?1", rusqlite::params![id])?;
  tx.execute(
    "DELETE FROM listing_requirements WHERE listing_id = ?1",
    rusqlite::params![id],
  )?;
  tx.execute("DELETE FROM listing_benefits WHERE listing_id = ?1", rusqlite::params![id])?;
  tx.execute("DELETE FROM listings WHERE id = ?1", rusqlite::params![id])?;

  Ok(true)
}

// ─── ListingStore impl ───────────────────────────────────────────────────────

impl ListingStore for SqliteStore {
  type Error = Error;

  // ── Reference upsert ──────────────────────────────────────────────────

  async fn get_or_create_company(&self, name: &str) -> Result<Option<i64>> {
    self.get_or_create_reference("companies", name, None).await
  }

  async fn get_or_create_skill(
    &self,
    name: &str,
    category: Option<&str>,
  ) -> Result<Option<i64>> {
    self.get_or_create_reference("skills", name, category).await
  }

  async fn get_or_create_requirement(&self, text: &str) -> Result<Option<i64>> {
    self.get_or_create_reference("requirements", text, None).await
  }

  async fn get_or_create_benefit(&self, text: &str) -> Result<Option<i64>> {
    self.get_or_create_reference("benefits", text, None).await
  }

  async fn top_references(
    &self,
    kind: ReferenceKind,
    limit: usize,
  ) -> Result<Vec<ReferenceEntity>> {
    let table     = reference_table(kind);
    let columns   = reference_columns(kind);
    // Placeholder company names from sloppy scrapes would otherwise
    // dominate the ranking.
    let name_filter = match kind {
      ReferenceKind::Company => {
        "WHERE name NOT IN ('Unknown', 'null', 'Not specified')"
      }
      _ => "",
    };
    let limit = limit as i64;

    let raws: Vec<RawReference> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {columns} FROM {table} {name_filter}
           ORDER BY count DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawReference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReference::into_reference).collect()
  }

  // ── Listings ──────────────────────────────────────────────────────────

  async fn create_listing(&self, input: NewListing) -> Result<i64> {
    let now_str     = encode_dt(Utc::now());
    let description = encode_description(&input.description)?;
    let deadline    = input.deadline.map(encode_date);

    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(
          "INSERT INTO listings (
             source, source_id, scope_query, scope_location, url, title,
             company_id, location, description, price, price_m2, deadline,
             status, first_seen_at, last_seen_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     'new', ?13, ?13)",
          rusqlite::params![
            input.source,
            input.source_id,
            input.scope.query,
            input.scope.location,
            input.url,
            input.title,
            input.company_id,
            input.location,
            description,
            input.price,
            input.price_m2,
            deadline,
            now_str,
          ],
        )?;
        let id = tx.last_insert_rowid();

        for skill_id in &input.skill_ids {
          tx.execute(
            "INSERT OR IGNORE INTO listing_skills (listing_id, skill_id) VALUES (?1, ?2)",
            rusqlite::params![id, skill_id],
          )?;
        }
        for requirement_id in &input.requirement_ids {
          tx.execute(
            "INSERT OR IGNORE INTO listing_requirements (listing_id, requirement_id)
             VALUES (?1, ?2)",
            rusqlite::params![id, requirement_id],
          )?;
        }
        for benefit_id in &input.benefit_ids {
          tx.execute(
            "INSERT OR IGNORE INTO listing_benefits (listing_id, benefit_id) VALUES (?1, ?2)",
            rusqlite::params![id, benefit_id],
          )?;
        }

        tx.commit()?;
        Ok(id)
      })
      .await?;

    Ok(id)
  }

  async fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
    let raw: Option<RawListing> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
              rusqlite::params![id],
              RawListing::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawListing::into_listing).transpose()
  }

  async fn listing_exists(&self, source: &str, source_id: &str) -> Result<bool> {
    let source    = source.to_owned();
    let source_id = source_id.to_owned();

    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM listings WHERE source = ?1 AND source_id = ?2",
              rusqlite::params![source, source_id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(exists)
  }

  async fn listings_by_status(
    &self,
    status: ListingStatus,
    limit: usize,
  ) -> Result<Vec<Listing>> {
    let status = status.as_str();
    let limit  = limit as i64;

    let raws: Vec<RawListing> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LISTING_COLUMNS} FROM listings
           WHERE status = ?1 ORDER BY first_seen_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status, limit], RawListing::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawListing::into_listing).collect()
  }

  async fn listing_references(
    &self,
    id: i64,
    kind: ReferenceKind,
  ) -> Result<Vec<ReferenceEntity>> {
    let columns = reference_columns(kind);

    let raws: Vec<RawReference> = self
      .conn
      .call(move |conn| {
        let sql = match kind {
          // The company is referenced directly on the listing row, not via
          // a link table.
          // `id` alone is ambiguous here: both joined tables have one.
          ReferenceKind::Company => format!(
            "SELECT companies.{columns} FROM companies
             JOIN listings ON listings.company_id = companies.id
             WHERE listings.id = ?1"
          ),
          ReferenceKind::Skill => format!(
            "SELECT {columns} FROM skills
             JOIN listing_skills ON listing_skills.skill_id = skills.id
             WHERE listing_skills.listing_id = ?1"
          ),
          ReferenceKind::Requirement => format!(
            "SELECT {columns} FROM requirements
             JOIN listing_requirements
               ON listing_requirements.requirement_id = requirements.id
             WHERE listing_requirements.listing_id = ?1"
          ),
          ReferenceKind::Benefit => format!(
            "SELECT {columns} FROM benefits
             JOIN listing_benefits ON listing_benefits.benefit_id = benefits.id
             WHERE listing_benefits.listing_id = ?1"
          ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id], RawReference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReference::into_reference).collect()
  }

  async fn update_status(&self, id: i64, status: ListingStatus) -> Result<()> {
    let now_str = encode_dt(Utc::now());

    // Read, validate, and write in ONE transaction, so the status checked
    // is the status replaced even when the handle is shared across tasks.
    // Domain rejections ride out in the Ok payload; they must not be
    // flattened into the database error channel.
    let outcome: std::result::Result<(), Error> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let current: Option<String> = tx
          .query_row(
            "SELECT status FROM listings WHERE id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;

        let Some(current) = current else {
          return Ok(Err(Error::ListingNotFound(id)));
        };
        let current = match ListingStatus::parse(&current) {
          Ok(parsed) => parsed,
          Err(e) => return Ok(Err(Error::Core(e))),
        };
        if let Err(e) = current.transition_to(status) {
          return Ok(Err(Error::Core(e)));
        }

        tx.execute(
          "UPDATE listings SET status = ?1, last_seen_at = ?2 WHERE id = ?3",
          rusqlite::params![status.as_str(), now_str, id],
        )?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    outcome
  }

  // ── Reconciliation ────────────────────────────────────────────────────

  async fn sync_batch(
    &self,
    source: &str,
    scope: &SearchScope,
    found: &[ScrapedListing],
  ) -> Result<SyncOutcome> {
    let found_keys = reconcile::found_keys(found);
    let source_owned = source.to_owned();
    let scope_owned  = scope.clone();
    let now          = Utc::now();

    let classification = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut stmt = tx.prepare(
          "SELECT id, source_id FROM listings
           WHERE source = ?1
             AND status IN ('new', 'active')
             AND scope_query = ?2
             AND scope_location = ?3",
        )?;
        let db_rows: Vec<(i64, String)> = stmt
          .query_map(
            rusqlite::params![
              source_owned,
              scope_owned.query,
              scope_owned.location
            ],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let db_keys = db_rows.iter().map(|(_, key)| key.clone()).collect();
        let classification = reconcile::classify(&found_keys, &db_keys);

        // Still-present rows: refresh the sighting and mark active. Rows
        // here are limited to status new/active, so new→active and
        // active→active are the only transitions this can perform.
        let now_str = encode_dt(now);
        for (id, key) in &db_rows {
          if classification.existing.contains(key) {
            tx.execute(
              "UPDATE listings SET status = 'active', last_seen_at = ?1 WHERE id = ?2",
              rusqlite::params![now_str, id],
            )?;
          }
        }

        // Vanished rows: archive in the same transaction.
        for (id, key) in &db_rows {
          if classification.closed.contains(key) {
            archive_in_tx(&tx, *id, CloseReason::Closed, now)?;
          }
        }

        tx.commit()?;
        Ok(classification)
      })
      .await?;

    let outcome = SyncOutcome {
      new: found
        .iter()
        .filter(|listing| classification.new.contains(&listing.source_id))
        .cloned()
        .collect(),
      existing: classification.existing.len(),
      closed:   classification.closed.len(),
    };

    info!(
      source,
      new = outcome.new.len(),
      existing = outcome.existing,
      closed = outcome.closed,
      "sync pass reconciled"
    );
    Ok(outcome)
  }

  // ── Archival ──────────────────────────────────────────────────────────

  async fn archive_listing(&self, id: i64, reason: CloseReason) -> Result<bool> {
    let now = Utc::now();

    let archived = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let archived = archive_in_tx(&tx, id, reason, now)?;
        tx.commit()?;
        Ok(archived)
      })
      .await?;

    if archived {
      info!(id, reason = reason.as_str(), "archived listing");
    }
    Ok(archived)
  }

  async fn expire_by_deadline(&self) -> Result<usize> {
    let today = encode_date(Utc::now().date_naive());

    let expired_ids: Vec<i64> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id FROM listings WHERE deadline IS NOT NULL AND deadline < ?1",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![today], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
      })
      .await?;

    // Best-effort sweep: each archive is its own transaction and one bad
    // record must not abort the rest.
    let mut archived = 0usize;
    for id in expired_ids {
      match self.archive_listing(id, CloseReason::Expired).await {
        Ok(true) => archived += 1,
        Ok(false) => {}
        Err(e) => warn!(id, error = %e, "failed to archive expired listing"),
      }
    }

    info!(archived, "deadline sweep complete");
    Ok(archived)
  }

  async fn get_archived(&self, id: i64) -> Result<Option<ArchivedListing>> {
    let raw: Option<RawArchived> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {LISTING_COLUMNS}, archived_at, close_reason, lifetime_days
                 FROM listings_archive WHERE id = ?1"
              ),
              rusqlite::params![id],
              RawArchived::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawArchived::into_archived).transpose()
  }

  // ── Price history ─────────────────────────────────────────────────────

  async fn record_price(
    &self,
    id: i64,
    price: Option<f64>,
    price_m2: Option<f64>,
  ) -> Result<bool> {
    let now_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let row: Option<(String, String, Option<f64>, Option<f64>)> = tx
          .query_row(
            "SELECT source, source_id, price, price_m2 FROM listings WHERE id = ?1",
            rusqlite::params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
          )
          .optional()?;

        let Some((source, source_id, old_price, old_price_m2)) = row else {
          return Ok(false);
        };

        if old_price == price && old_price_m2 == price_m2 {
          return Ok(false);
        }

        // The log records the value being replaced, not the new one.
        tx.execute(
          "INSERT INTO price_history (source, source_id, price, price_m2, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![source, source_id, old_price, old_price_m2, now_str],
        )?;
        tx.execute(
          "UPDATE listings SET price = ?1, price_m2 = ?2 WHERE id = ?3",
          rusqlite::params![price, price_m2, id],
        )?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(changed)
  }

  async fn price_history(
    &self,
    source: &str,
    source_id: &str,
  ) -> Result<Vec<PricePoint>> {
    let source    = source.to_owned();
    let source_id = source_id.to_owned();

    let raws: Vec<RawPricePoint> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT source, source_id, price, price_m2, recorded_at
           FROM price_history
           WHERE source = ?1 AND source_id = ?2
           ORDER BY recorded_at ASC, id ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![source, source_id], |r| {
            Ok(RawPricePoint {
              source:      r.get(0)?,
              source_id:   r.get(1)?,
              price:       r.get(2)?,
              price_m2:    r.get(3)?,
              recorded_at: r.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPricePoint::into_point).collect()
  }

  // ── Statistics ────────────────────────────────────────────────────────

  async fn stats(&self) -> Result<StoreStats> {
    let stats = self
      .conn
      .call(|conn| {
        let count = |table: &str| -> rusqlite::Result<i64> {
          conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };

        let mut stats = StoreStats {
          active_listings:   count("listings")?,
          archived_listings: count("listings_archive")?,
          companies:         count("companies")?,
          skills:            count("skills")?,
          requirements:      count("requirements")?,
          benefits:          count("benefits")?,
          ..StoreStats::default()
        };

        let mut stmt =
          conn.prepare("SELECT status, COUNT(*) FROM listings GROUP BY status")?;
        let rows = stmt
          .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        stats.by_status = rows.into_iter().collect();

        Ok(stats)
      })
      .await?;

    Ok(stats)
  }
}
