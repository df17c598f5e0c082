use chrono::{Duration, Utc};
use vigil_core::{
  listing::{CloseReason, ListingStatus, ScrapedListing, SearchScope},
  loader::BatchLoader,
  reconcile::SyncOutcome,
  reference::ReferenceKind,
  store::ListingStore,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store should open")
}

fn scraped(source_id: &str) -> ScrapedListing {
  ScrapedListing {
    title: Some(format!("listing {source_id}")),
    url: Some(format!("https://example.test/{source_id}")),
    ..ScrapedListing::with_source_id(source_id)
  }
}

fn scope() -> SearchScope { SearchScope::new("rust developer", "prague") }

/// One full pipeline pass: reconcile the batch, then save whatever the
/// reconciler classified as new.
async fn sync_and_save(
  store: &SqliteStore,
  source: &str,
  scope: &SearchScope,
  batch: &[ScrapedListing],
) -> SyncOutcome {
  let outcome = store.sync_batch(source, scope, batch).await.unwrap();
  BatchLoader::new(store, source, scope.clone())
    .save_batch(&outcome.new)
    .await
    .unwrap();
  outcome
}

// ─── Reference upsert ────────────────────────────────────────────────────────

#[tokio::test]
async fn company_upsert_dedupes_case_and_whitespace() {
  let store = store().await;

  let a = store.get_or_create_company("Docker").await.unwrap().unwrap();
  let b = store.get_or_create_company("docker").await.unwrap().unwrap();
  let c = store.get_or_create_company("  Docker  ").await.unwrap().unwrap();
  assert_eq!(a, b);
  assert_eq!(a, c);

  let top = store.top_references(ReferenceKind::Company, 10).await.unwrap();
  assert_eq!(top.len(), 1);
  assert_eq!(top[0].count, 3);
  // The first sighting's display form is kept.
  assert_eq!(top[0].name, "Docker");
}

#[tokio::test]
async fn blank_reference_input_is_a_noop() {
  let store = store().await;

  assert_eq!(store.get_or_create_company("").await.unwrap(), None);
  assert_eq!(store.get_or_create_skill("   ", None).await.unwrap(), None);
  assert_eq!(store.get_or_create_requirement("\t").await.unwrap(), None);
  assert_eq!(store.get_or_create_benefit("").await.unwrap(), None);

  let stats = store.stats().await.unwrap();
  assert_eq!(stats.companies, 0);
  assert_eq!(stats.skills, 0);
  assert_eq!(stats.requirements, 0);
  assert_eq!(stats.benefits, 0);
}

#[tokio::test]
async fn skill_category_recorded_on_first_sighting() {
  let store = store().await;

  let id = store
    .get_or_create_skill("Kubernetes", Some("devops"))
    .await
    .unwrap()
    .unwrap();
  // A later sighting with a different category does not overwrite.
  let again = store
    .get_or_create_skill("kubernetes", Some("cloud"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(id, again);

  let top = store.top_references(ReferenceKind::Skill, 10).await.unwrap();
  assert_eq!(top[0].category.as_deref(), Some("devops"));
  assert_eq!(top[0].count, 2);
}

#[tokio::test]
async fn top_references_orders_by_count() {
  let store = store().await;

  for _ in 0..3 {
    store.get_or_create_skill("rust", None).await.unwrap();
  }
  store.get_or_create_skill("go", None).await.unwrap();

  let top = store.top_references(ReferenceKind::Skill, 10).await.unwrap();
  assert_eq!(top[0].name, "rust");
  assert_eq!(top[0].count, 3);
  assert_eq!(top[1].name, "go");
}

// ─── Save path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_and_fetch_listing_roundtrip() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());

  let mut input = scraped("r-1");
  input.company = Some("Acme".into());
  input.location = Some("Prague".into());
  input.description = vec!["First paragraph.".into(), "Second.".into()];
  input.skills = vec!["Rust".into(), "SQL".into()];
  input.benefits = vec!["Remote".into()];

  let id = loader.save_listing(&input).await.unwrap().unwrap();
  let listing = store.get_listing(id).await.unwrap().unwrap();

  assert_eq!(listing.source, "jobsite");
  assert_eq!(listing.source_id, "r-1");
  assert_eq!(listing.scope, scope());
  assert_eq!(listing.title.as_deref(), Some("listing r-1"));
  assert_eq!(listing.description.len(), 2);
  assert_eq!(listing.status, ListingStatus::New);
  assert!(listing.company_id.is_some());

  let skills = store.listing_references(id, ReferenceKind::Skill).await.unwrap();
  let mut names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
  names.sort();
  assert_eq!(names, ["Rust", "SQL"]);

  let companies =
    store.listing_references(id, ReferenceKind::Company).await.unwrap();
  assert_eq!(companies.len(), 1);
  assert_eq!(companies[0].name, "Acme");
}

#[tokio::test]
async fn duplicate_natural_key_is_skipped_not_updated() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());

  let first = scraped("dup-1");
  let id = loader.save_listing(&first).await.unwrap().unwrap();

  let mut second = scraped("dup-1");
  second.title = Some("changed title".into());
  assert_eq!(loader.save_listing(&second).await.unwrap(), None);

  let listing = store.get_listing(id).await.unwrap().unwrap();
  assert_eq!(listing.title.as_deref(), Some("listing dup-1"));

  let stats = loader.save_batch(&[scraped("dup-1"), scraped("dup-2")]).await.unwrap();
  assert_eq!(stats.saved, 1);
  assert_eq!(stats.skipped, 1);
  assert_eq!(stats.total, 2);
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_classifies_new_existing_and_closed() {
  let store = store().await;
  let scope = scope();

  let first = sync_and_save(&store, "jobsite", &scope, &[scraped("A"), scraped("B")]).await;
  assert_eq!(first.new.len(), 2);
  assert_eq!(first.existing, 0);
  assert_eq!(first.closed, 0);

  let a_id = {
    let listings = store.listings_by_status(ListingStatus::New, 10).await.unwrap();
    listings.iter().find(|l| l.source_id == "A").unwrap().id
  };

  let second = sync_and_save(&store, "jobsite", &scope, &[scraped("B"), scraped("C")]).await;
  assert_eq!(second.new.len(), 1);
  assert_eq!(second.new[0].source_id, "C");
  assert_eq!(second.existing, 1);
  assert_eq!(second.closed, 1);

  // A is gone from the active table and sits in the archive, reason closed.
  assert!(!store.listing_exists("jobsite", "A").await.unwrap());
  let archived = store.get_archived(a_id).await.unwrap().unwrap();
  assert_eq!(archived.close_reason, CloseReason::Closed);
  assert_eq!(archived.source_id, "A");

  // Active set is exactly {B, C}.
  assert!(store.listing_exists("jobsite", "B").await.unwrap());
  assert!(store.listing_exists("jobsite", "C").await.unwrap());
  assert_eq!(store.stats().await.unwrap().active_listings, 2);
}

#[tokio::test]
async fn resync_of_identical_batch_is_idempotent() {
  let store = store().await;
  let scope = scope();
  let batch = [scraped("A"), scraped("B")];

  sync_and_save(&store, "jobsite", &scope, &batch).await;
  let again = sync_and_save(&store, "jobsite", &scope, &batch).await;

  assert!(again.new.is_empty());
  assert_eq!(again.existing, 2);
  assert_eq!(again.closed, 0);

  let stats = store.stats().await.unwrap();
  assert_eq!(stats.active_listings, 2);
  assert_eq!(stats.archived_listings, 0);
  // Re-observed rows moved new → active.
  assert_eq!(stats.by_status.get("active"), Some(&2));
}

#[tokio::test]
async fn empty_batch_closes_the_whole_scope() {
  let store = store().await;
  let scope = scope();

  sync_and_save(&store, "jobsite", &scope, &[scraped("A"), scraped("B")]).await;
  let outcome = store.sync_batch("jobsite", &scope, &[]).await.unwrap();

  assert_eq!(outcome.closed, 2);
  let stats = store.stats().await.unwrap();
  assert_eq!(stats.active_listings, 0);
  assert_eq!(stats.archived_listings, 2);
}

#[tokio::test]
async fn sync_only_touches_its_own_scope() {
  let store = store().await;
  let prague = SearchScope::new("rust", "prague");
  let brno = SearchScope::new("rust", "brno");

  sync_and_save(&store, "jobsite", &prague, &[scraped("P-1")]).await;
  sync_and_save(&store, "jobsite", &brno, &[scraped("B-1")]).await;

  // An empty pass over prague must not close the brno listing.
  let outcome = store.sync_batch("jobsite", &prague, &[]).await.unwrap();
  assert_eq!(outcome.closed, 1);
  assert!(store.listing_exists("jobsite", "B-1").await.unwrap());
}

// ─── Archival ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_moves_row_and_drops_relations() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());

  let mut input = scraped("arch-1");
  input.skills = vec!["Rust".into()];
  let id = loader.save_listing(&input).await.unwrap().unwrap();

  assert!(store.archive_listing(id, CloseReason::NotFound).await.unwrap());

  assert!(store.get_listing(id).await.unwrap().is_none());
  assert!(store
    .listing_references(id, ReferenceKind::Skill)
    .await
    .unwrap()
    .is_empty());

  let archived = store.get_archived(id).await.unwrap().unwrap();
  assert_eq!(archived.close_reason, CloseReason::NotFound);
  assert_eq!(archived.lifetime_days, 0);

  // Archiving an already-archived id is a benign no-op.
  assert!(!store.archive_listing(id, CloseReason::Closed).await.unwrap());
}

#[tokio::test]
async fn lifetime_days_floors_partial_days() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());
  let id = loader.save_listing(&scraped("old-1")).await.unwrap().unwrap();

  // Backdate the first sighting to 10 days and 3 hours ago.
  let first_seen = (Utc::now() - Duration::days(10) - Duration::hours(3)).to_rfc3339();
  store
    .conn
    .call(move |conn| {
      conn.execute(
        "UPDATE listings SET first_seen_at = ?1 WHERE id = ?2",
        rusqlite::params![first_seen, id],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  store.archive_listing(id, CloseReason::Expired).await.unwrap();
  let archived = store.get_archived(id).await.unwrap().unwrap();
  assert_eq!(archived.lifetime_days, 10);
}

#[tokio::test]
async fn failed_archive_rolls_back_whole_transaction() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());

  let mut input = scraped("atomic-1");
  input.skills = vec!["Rust".into()];
  let id = loader.save_listing(&input).await.unwrap().unwrap();

  // Occupy the archive slot so the mid-transaction insert hits a primary
  // key violation.
  let now = Utc::now().to_rfc3339();
  store
    .conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO listings_archive (
           id, source, source_id, status, first_seen_at, last_seen_at,
           archived_at, close_reason, lifetime_days
         ) VALUES (?1, 'jobsite', 'atomic-1', 'closed', ?2, ?2, ?2, 'closed', 0)",
        rusqlite::params![id, now],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let err = store.archive_listing(id, CloseReason::Closed).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));

  // Nothing was partially applied: the active row and its relations remain.
  assert!(store.get_listing(id).await.unwrap().is_some());
  assert_eq!(
    store
      .listing_references(id, ReferenceKind::Skill)
      .await
      .unwrap()
      .len(),
    1
  );
}

#[tokio::test]
async fn expire_sweeps_only_past_deadlines() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());
  let today = Utc::now().date_naive();

  let mut past = scraped("past-1");
  past.deadline = Some(today - Duration::days(3));
  let mut future = scraped("future-1");
  future.deadline = Some(today + Duration::days(3));
  let undated = scraped("undated-1");

  let past_id = loader.save_listing(&past).await.unwrap().unwrap();
  loader.save_listing(&future).await.unwrap().unwrap();
  loader.save_listing(&undated).await.unwrap().unwrap();

  assert_eq!(store.expire_by_deadline().await.unwrap(), 1);

  let archived = store.get_archived(past_id).await.unwrap().unwrap();
  assert_eq!(archived.close_reason, CloseReason::Expired);
  assert!(store.listing_exists("jobsite", "future-1").await.unwrap());
  assert!(store.listing_exists("jobsite", "undated-1").await.unwrap());

  // Already swept; nothing left to expire.
  assert_eq!(store.expire_by_deadline().await.unwrap(), 0);
}

// ─── Status updates ──────────────────────────────────────────────────────────

#[tokio::test]
async fn update_status_enforces_the_state_machine() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());
  let id = loader.save_listing(&scraped("fsm-1")).await.unwrap().unwrap();

  store.update_status(id, ListingStatus::Active).await.unwrap();
  assert_eq!(
    store.get_listing(id).await.unwrap().unwrap().status,
    ListingStatus::Active
  );

  // Backwards is rejected.
  let err = store.update_status(id, ListingStatus::New).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(vigil_core::Error::IllegalTransition { .. })
  ));

  // Unknown id is its own error, not a silent no-op.
  let err = store.update_status(9999, ListingStatus::Active).await.unwrap_err();
  assert!(matches!(err, Error::ListingNotFound(9999)));
}

#[tokio::test]
async fn status_write_validates_against_the_committed_row() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "jobsite", scope());
  let id = loader.save_listing(&scraped("fsm-2")).await.unwrap().unwrap();

  // Another writer closes the listing after our caller last looked at it.
  store
    .conn
    .call(move |conn| {
      conn.execute(
        "UPDATE listings SET status = 'closed' WHERE id = ?1",
        rusqlite::params![id],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  // The stale activation must be rejected against the row as it is NOW,
  // not as the caller remembers it.
  let err = store.update_status(id, ListingStatus::Active).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(vigil_core::Error::IllegalTransition { .. })
  ));
  assert_eq!(
    store.get_listing(id).await.unwrap().unwrap().status,
    ListingStatus::Closed
  );
}

// ─── Price history ───────────────────────────────────────────────────────────

#[tokio::test]
async fn price_change_appends_the_old_value() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "reality", scope());

  let mut input = scraped("flat-1");
  input.price = Some(100_000.0);
  input.price_m2 = Some(2_000.0);
  let id = loader.save_listing(&input).await.unwrap().unwrap();

  // Unchanged price writes nothing.
  assert!(!store.record_price(id, Some(100_000.0), Some(2_000.0)).await.unwrap());
  assert!(store.price_history("reality", "flat-1").await.unwrap().is_empty());

  // A change logs the value being replaced and updates the listing.
  assert!(store.record_price(id, Some(120_000.0), Some(2_400.0)).await.unwrap());
  let history = store.price_history("reality", "flat-1").await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].price, Some(100_000.0));
  assert_eq!(history[0].price_m2, Some(2_000.0));

  let listing = store.get_listing(id).await.unwrap().unwrap();
  assert_eq!(listing.price, Some(120_000.0));
}

#[tokio::test]
async fn price_history_survives_archival() {
  let store = store().await;
  let loader = BatchLoader::new(&store, "reality", scope());

  let mut input = scraped("flat-2");
  input.price = Some(50.0);
  let id = loader.save_listing(&input).await.unwrap().unwrap();

  store.record_price(id, Some(60.0), None).await.unwrap();
  store.archive_listing(id, CloseReason::Closed).await.unwrap();

  let history = store.price_history("reality", "flat-2").await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].price, Some(50.0));
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_reflect_active_archive_and_references() {
  let store = store().await;
  let scope = scope();

  sync_and_save(&store, "jobsite", &scope, &[scraped("S-1"), scraped("S-2")]).await;
  store.get_or_create_company("Acme").await.unwrap();
  store.get_or_create_skill("rust", None).await.unwrap();

  let id = {
    let listings = store.listings_by_status(ListingStatus::New, 10).await.unwrap();
    listings[0].id
  };
  store.archive_listing(id, CloseReason::Duplicate).await.unwrap();

  let stats = store.stats().await.unwrap();
  assert_eq!(stats.active_listings, 1);
  assert_eq!(stats.archived_listings, 1);
  assert_eq!(stats.companies, 1);
  assert_eq!(stats.skills, 1);
  assert_eq!(stats.by_status.get("new"), Some(&1));
}
