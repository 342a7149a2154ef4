//! Local persistence for fetched movies and offline fallback.
//!
//! One snapshot of items lives per query; a successful non-empty fetch
//! replaces the previous snapshot wholesale. Reads come in two views: by
//! query (substring match on title) and the union across all queries.

mod store;

pub use store::{MovieStore, NoopStore, SqliteStore};
