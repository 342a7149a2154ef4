//! Error types for the data-loading pipeline.

use reqwest::StatusCode;

/// Failure of a single page load.
///
/// Every way a page fetch can go wrong ends up here so the presentation
/// layer sees exactly one error channel. `Api` covers the OMDb quirk of
/// reporting failures inside an HTTP 200 body (`"Response": "False"`).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
  /// Connection-level failure: no usable response was received.
  #[error("network error: {0}")]
  Network(#[source] reqwest::Error),

  /// The server was reachable but answered with a non-success status.
  #[error("server returned HTTP {status}")]
  Http { status: StatusCode },

  /// Well-formed response whose payload signals failure, with the
  /// server-provided message ("Movie not found!" and friends).
  #[error("{0}")]
  Api(String),

  /// The local cache could not serve a read it was asked for.
  #[error("cache unavailable: {0}")]
  Cache(#[from] StoreError),
}

impl LoadError {
  /// Message for the server's logical-failure sentinel, falling back to a
  /// generic text when the body carried no `Error` field.
  pub fn api(message: Option<String>) -> Self {
    LoadError::Api(message.unwrap_or_else(|| "Unknown error".to_string()))
  }
}

/// Failure inside the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("cache database lock poisoned")]
  Poisoned,

  #[error("could not open cache database: {0}")]
  Open(String),

  #[error("bad timestamp in cache row: {0}")]
  Timestamp(String),
}
