//! Core types and trait definitions for the Vigil listing store.
//!
//! This crate is deliberately free of database dependencies. The storage
//! backend (`vigil-store-sqlite`) and the CLI depend on it; it depends on
//! nothing proprietary.

pub mod archive;
pub mod error;
pub mod listing;
pub mod loader;
pub mod reconcile;
pub mod reference;
pub mod store;

pub use error::{Error, Result};
