//! Error types for `vigil-core`.

use thiserror::Error;

use crate::listing::ListingStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("illegal status transition: {from:?} -> {to:?}")]
  IllegalTransition {
    from: ListingStatus,
    to:   ListingStatus,
  },

  #[error("unknown listing status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown close reason: {0:?}")]
  UnknownCloseReason(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
