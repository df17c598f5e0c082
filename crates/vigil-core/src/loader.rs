//! `BatchLoader` — turns classified-new scraped listings into full records.
//!
//! The reconciler only classifies; something still has to resolve reference
//! entities and insert the new rows. The loader drives that save path
//! against the [`ListingStore`] seam: skip listings whose natural key is
//! already persisted, upsert company/skill/requirement/benefit references,
//! then create the listing with its relation links.

use serde::{Deserialize, Serialize};

use crate::{
  listing::{NewListing, ScrapedListing, SearchScope},
  store::ListingStore,
};

/// Counters for one `save_batch` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
  pub saved:   usize,
  pub skipped: usize,
  pub total:   usize,
}

/// Saves scraped listings for one `(source, scope)` into a store.
pub struct BatchLoader<'s, S: ListingStore> {
  store:  &'s S,
  source: String,
  scope:  SearchScope,
}

impl<'s, S: ListingStore> BatchLoader<'s, S> {
  pub fn new(store: &'s S, source: impl Into<String>, scope: SearchScope) -> Self {
    Self { store, source: source.into(), scope }
  }

  /// Save one listing. Returns the new id, or `None` when the natural key
  /// is already persisted (the listing is skipped, not updated).
  pub async fn save_listing(
    &self,
    scraped: &ScrapedListing,
  ) -> Result<Option<i64>, S::Error> {
    if self
      .store
      .listing_exists(&self.source, &scraped.source_id)
      .await?
    {
      return Ok(None);
    }

    let company_id = match &scraped.company {
      Some(name) => self.store.get_or_create_company(name).await?,
      None => None,
    };

    let mut skill_ids = Vec::with_capacity(scraped.skills.len());
    for skill in &scraped.skills {
      if let Some(id) = self.store.get_or_create_skill(skill, None).await? {
        skill_ids.push(id);
      }
    }

    let mut requirement_ids = Vec::with_capacity(scraped.requirements.len());
    for requirement in &scraped.requirements {
      if let Some(id) = self.store.get_or_create_requirement(requirement).await? {
        requirement_ids.push(id);
      }
    }

    let mut benefit_ids = Vec::with_capacity(scraped.benefits.len());
    for benefit in &scraped.benefits {
      if let Some(id) = self.store.get_or_create_benefit(benefit).await? {
        benefit_ids.push(id);
      }
    }

    let id = self
      .store
      .create_listing(NewListing {
        source: self.source.clone(),
        source_id: scraped.source_id.clone(),
        scope: self.scope.clone(),
        url: scraped.url.clone(),
        title: scraped.title.clone(),
        company_id,
        location: scraped.location.clone(),
        description: scraped.description.clone(),
        price: scraped.price,
        price_m2: scraped.price_m2,
        deadline: scraped.deadline,
        skill_ids,
        requirement_ids,
        benefit_ids,
      })
      .await?;

    Ok(Some(id))
  }

  /// Save a whole batch, counting saves and skips. A storage error aborts
  /// the batch — creation is not best-effort the way the expire sweep is.
  pub async fn save_batch(
    &self,
    listings: &[ScrapedListing],
  ) -> Result<LoadStats, S::Error> {
    let mut stats = LoadStats { total: listings.len(), ..LoadStats::default() };

    for scraped in listings {
      match self.save_listing(scraped).await? {
        Some(_) => stats.saved += 1,
        None => stats.skipped += 1,
      }
    }

    Ok(stats)
  }
}
