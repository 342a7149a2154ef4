//! OMDb API access: wire types, domain types, and the HTTP client.

pub mod api_types;
mod client;
mod types;

pub use client::OmdbClient;
pub use types::{Movie, SearchPage};

use async_trait::async_trait;

use crate::error::LoadError;

/// Port for the remote search source.
///
/// `search_movies` is a pure function of (query, page): stateless between
/// calls, so callers can retry or restart freely. The pager and repository
/// depend on this trait rather than the concrete client so tests can swap in
/// an in-memory fake.
#[async_trait]
pub trait SearchApi: Send + Sync {
  async fn search_movies(&self, query: &str, page: u32) -> Result<SearchPage, LoadError>;
}
