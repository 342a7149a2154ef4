use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::LoadError;

use super::api_types::ApiSearchResponse;
use super::types::SearchPage;
use super::SearchApi;

/// OMDb API client.
#[derive(Clone)]
pub struct OmdbClient {
  http: reqwest::Client,
  base_url: Url,
  api_key: String,
}

impl OmdbClient {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;

    let base_url = Url::parse(&config.omdb.url)
      .map_err(|e| eyre!("Invalid OMDb URL {}: {}", config.omdb.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      api_key,
    })
  }

  /// Host the client talks to, for the connectivity probe.
  pub fn host(&self) -> Option<String> {
    self.base_url.host_str().map(String::from)
  }
}

#[async_trait]
impl SearchApi for OmdbClient {
  /// Fetch one page of search results for `query`.
  ///
  /// `GET {base}?apikey=..&s={query}&page={page}`. Pages are 1-based and
  /// ten results wide on the server side.
  async fn search_movies(&self, query: &str, page: u32) -> Result<SearchPage, LoadError> {
    let mut url = self.base_url.clone();
    url
      .query_pairs_mut()
      .append_pair("apikey", &self.api_key)
      .append_pair("s", query)
      .append_pair("page", &page.to_string());

    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(LoadError::Network)?;

    let status = response.status();
    if !status.is_success() {
      return Err(LoadError::Http { status });
    }

    let body: ApiSearchResponse = response.json().await.map_err(LoadError::Network)?;
    body.into_page()
  }
}
