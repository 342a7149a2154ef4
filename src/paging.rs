//! Incremental page loading over the remote source and the cache.
//!
//! `MoviePager` turns "give me page N" requests into pages with
//! previous/next cursors, writing successful fetches through to the store.
//! `CachePager` serves the same page contract from the local store.
//! `PagedList` stitches loaded pages together and resolves the refresh key
//! that anchors a full reload near the user's position.

use std::sync::Arc;

use crate::cache::MovieStore;
use crate::error::LoadError;
use crate::omdb::{Movie, SearchApi};

/// 1-based page cursor.
pub type PageKey = u32;

pub const FIRST_PAGE: PageKey = 1;

/// One loaded page with its neighbor cursors.
///
/// An absent `next_key` means the sequence ended at this page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
  pub movies: Vec<Movie>,
  pub prev_key: Option<PageKey>,
  pub next_key: Option<PageKey>,
  /// Server-reported total match count, when the source provides one.
  pub total_results: Option<u32>,
}

/// Per-session status of a loading list.
#[derive(Debug, Clone)]
pub enum LoadState {
  Idle,
  Loading,
  Loaded { count: usize, end_of_data: bool },
  Error(Arc<LoadError>),
}

impl LoadState {
  pub fn is_loading(&self) -> bool {
    matches!(self, LoadState::Loading)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, LoadState::Error(_))
  }

  pub fn error(&self) -> Option<&LoadError> {
    match self {
      LoadState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Pager over the remote search source for one query.
///
/// Stateless between calls: every `load` is a pure request for one page, and
/// all accumulated state lives in the consuming `PagedList`. Restarting a
/// session is just constructing a new pager.
#[derive(Clone)]
pub struct MoviePager {
  api: Arc<dyn SearchApi>,
  store: Arc<dyn MovieStore>,
  query: String,
}

impl MoviePager {
  pub fn new(api: Arc<dyn SearchApi>, store: Arc<dyn MovieStore>, query: impl Into<String>) -> Self {
    Self {
      api,
      store,
      query: query.into(),
    }
  }

  /// Load one page. `None` means the first page.
  ///
  /// A successful non-empty page is written through to the store for this
  /// query; a cache write failure is logged and the page still succeeds,
  /// degrading to network-only behavior.
  pub async fn load(&self, key: Option<PageKey>) -> Result<Page, LoadError> {
    let page = key.unwrap_or(FIRST_PAGE);

    let fetched = self.api.search_movies(&self.query, page).await?;

    if !fetched.movies.is_empty() {
      if let Err(e) = self.store.save(&self.query, &fetched.movies) {
        tracing::warn!(query = %self.query, error = %e, "cache write failed; continuing without cache");
      }
    }

    Ok(Page {
      next_key: if fetched.movies.is_empty() {
        None
      } else {
        Some(page + 1)
      },
      prev_key: if page <= FIRST_PAGE {
        None
      } else {
        Some(page - 1)
      },
      movies: fetched.movies,
      total_results: fetched.total_results,
    })
  }
}

/// Which store view a cache pager reads.
#[derive(Debug, Clone)]
pub enum CacheView {
  /// Substring match on title for one query.
  ByQuery(String),
  /// Union across all queries, for the offline default listing.
  All,
}

/// Pager over the local store, restartable per read session.
#[derive(Clone)]
pub struct CachePager {
  store: Arc<dyn MovieStore>,
  view: CacheView,
  page_size: usize,
}

impl CachePager {
  pub fn new(store: Arc<dyn MovieStore>, view: CacheView, page_size: usize) -> Self {
    Self {
      store,
      view,
      page_size,
    }
  }

  pub fn load(&self, key: Option<PageKey>) -> Result<Page, LoadError> {
    let page = key.unwrap_or(FIRST_PAGE);
    let offset = (page - FIRST_PAGE) as usize * self.page_size;

    let movies = match &self.view {
      CacheView::ByQuery(query) => self.store.by_query(query, self.page_size, offset)?,
      CacheView::All => self.store.all(self.page_size, offset)?,
    };

    // A short page means the store has nothing past it.
    let next_key = if movies.len() < self.page_size {
      None
    } else {
      Some(page + 1)
    };

    Ok(Page {
      next_key,
      prev_key: if page <= FIRST_PAGE {
        None
      } else {
        Some(page - 1)
      },
      movies,
      total_results: None,
    })
  }
}

/// Accumulator stitching sequentially loaded pages into one list.
#[derive(Debug, Default, Clone)]
pub struct PagedList {
  pages: Vec<Page>,
  /// Index into the flattened item list of the entry the user last viewed.
  anchor: Option<usize>,
}

impl PagedList {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, page: Page) {
    self.pages.push(page);
  }

  pub fn is_empty(&self) -> bool {
    self.pages.is_empty()
  }

  pub fn item_count(&self) -> usize {
    self.pages.iter().map(|p| p.movies.len()).sum()
  }

  pub fn items(&self) -> impl Iterator<Item = &Movie> {
    self.pages.iter().flat_map(|p| p.movies.iter())
  }

  pub fn to_vec(&self) -> Vec<Movie> {
    self.items().cloned().collect()
  }

  /// Cursor for the next forward load; `None` once the last loaded page
  /// reported end of data (or nothing is loaded yet).
  pub fn next_key(&self) -> Option<PageKey> {
    self.pages.last().and_then(|p| p.next_key)
  }

  pub fn end_of_data(&self) -> bool {
    self
      .pages
      .last()
      .map(|p| p.next_key.is_none())
      .unwrap_or(false)
  }

  /// Latest server-reported total, from the most recent page carrying one.
  pub fn total_results(&self) -> Option<u32> {
    self.pages.iter().rev().find_map(|p| p.total_results)
  }

  pub fn set_anchor(&mut self, position: usize) {
    self.anchor = Some(position);
  }

  /// Page containing `position` in the flattened list, or the last page when
  /// the position runs past the loaded items.
  fn closest_page_to(&self, position: usize) -> Option<&Page> {
    let mut seen = 0;
    for page in &self.pages {
      seen += page.movies.len();
      if position < seen {
        return Some(page);
      }
    }
    self.pages.last()
  }

  /// Key to reload from so a refresh lands on the page the user is viewing:
  /// `prev_key + 1` of the anchored page, falling back to `next_key - 1`
  /// when that page has no previous key.
  pub fn refresh_key(&self) -> Option<PageKey> {
    let anchor = self.anchor?;
    let page = self.closest_page_to(anchor)?;
    page
      .prev_key
      .map(|k| k + 1)
      .or_else(|| page.next_key.map(|k| k - 1))
  }
}
