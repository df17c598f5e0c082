//! Reference entities — normalized, deduplicated lookup values shared
//! across many listings (companies, skills, requirements, benefits).
//!
//! Dedup key is the normalized text; the display form of the first sighting
//! is kept as the canonical name. Counts only increase and nothing is ever
//! deleted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which reference table a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
  Company,
  Skill,
  Requirement,
  Benefit,
}

impl ReferenceKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Company => "company",
      Self::Skill => "skill",
      Self::Requirement => "requirement",
      Self::Benefit => "benefit",
    }
  }
}

/// One deduplicated reference row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntity {
  pub id:         i64,
  /// Canonical display text (first-seen casing).
  pub name:       String,
  /// Observation count; increments on every repeated sighting.
  pub count:      i64,
  /// Immutable after creation.
  pub first_seen: NaiveDate,
  /// Refreshed on every repeated sighting.
  pub last_seen:  NaiveDate,
  /// Skills only (language / framework / tool / ...).
  pub category:   Option<String>,
}

/// The dedup key: trimmed and case-folded. Returns `None` for blank input,
/// which callers treat as "nothing to record".
pub fn normalize(name: &str) -> Option<String> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(trimmed.to_lowercase())
  }
}

#[cfg(test)]
mod tests {
  use super::normalize;

  #[test]
  fn casing_and_whitespace_variants_share_a_key() {
    assert_eq!(normalize("Python"), Some("python".into()));
    assert_eq!(normalize(" python "), Some("python".into()));
    assert_eq!(normalize("PYTHON"), Some("python".into()));
  }

  #[test]
  fn blank_input_has_no_key() {
    assert_eq!(normalize(""), None);
    assert_eq!(normalize("   "), None);
    assert_eq!(normalize("\t\n"), None);
  }
}
