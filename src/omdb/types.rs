/// A single movie search result.
///
/// Identity is the IMDb id: two movies with the same id are the same entity
/// and every other field is replaceable on re-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movie {
  pub imdb_id: String,
  pub title: String,
  /// "movie", "series", "episode", ...
  pub kind: String,
  pub year: String,
  /// Poster URL; `None` when OMDb has no artwork for the entry.
  pub poster: Option<String>,
}

/// One page of remote search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
  pub movies: Vec<Movie>,
  /// Total match count reported by the server, when parseable.
  pub total_results: Option<u32>,
}
