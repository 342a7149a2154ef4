//! Wire types for the OMDb search endpoint.
//!
//! Field names follow the OMDb JSON exactly (`Response`, `Search`, `imdbID`,
//! `Title`, `Type`, `Year`, `Poster`, `totalResults`, `Error`). Everything
//! except `Response` may be absent, so each field deserializes as optional.

use serde::Deserialize;

use crate::error::LoadError;

use super::types::{Movie, SearchPage};

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(rename = "Response")]
  pub response: String,
  #[serde(rename = "Search", default)]
  pub search: Option<Vec<ApiSearchItem>>,
  #[serde(rename = "totalResults", default)]
  pub total_results: Option<String>,
  #[serde(rename = "Error", default)]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSearchItem {
  #[serde(rename = "imdbID", default)]
  pub imdb_id: Option<String>,
  #[serde(rename = "Title", default)]
  pub title: Option<String>,
  #[serde(rename = "Type", default)]
  pub kind: Option<String>,
  #[serde(rename = "Year", default)]
  pub year: Option<String>,
  #[serde(rename = "Poster", default)]
  pub poster: Option<String>,
}

impl ApiSearchItem {
  pub fn into_movie(self) -> Movie {
    Movie {
      imdb_id: self.imdb_id.unwrap_or_default(),
      title: self.title.unwrap_or_default(),
      kind: self.kind.unwrap_or_default(),
      year: self.year.unwrap_or_default(),
      poster: self.poster.filter(|p| !p.is_empty() && p != "N/A"),
    }
  }
}

impl ApiSearchResponse {
  /// Convert the wire body into a page, turning the server's logical-failure
  /// sentinel (`Response == "False"` inside an HTTP 200) into an error.
  pub fn into_page(self) -> Result<SearchPage, LoadError> {
    if self.response == "False" {
      return Err(LoadError::api(self.error));
    }

    let movies = self
      .search
      .unwrap_or_default()
      .into_iter()
      .map(ApiSearchItem::into_movie)
      .collect();

    let total_results = self.total_results.as_deref().and_then(|t| t.parse().ok());

    Ok(SearchPage {
      movies,
      total_results,
    })
  }
}
