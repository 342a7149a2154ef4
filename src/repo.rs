//! Repository-level orchestration: the single decision point mapping
//! triggers (initial load, query change, manual refresh, retry) to the
//! network pager or the cache fallback.
//!
//! The repository publishes `ListSnapshot`s through a watch channel; the
//! presentation boundary renders whatever the latest snapshot derives to.
//! Exactly one fetch sequence is in flight at a time: a new trigger aborts
//! the previous task and a generation counter discards anything a stale
//! task might still publish (last-query-wins).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::cache::MovieStore;
use crate::connectivity::Connectivity;
use crate::error::LoadError;
use crate::omdb::{Movie, SearchApi};
use crate::paging::{CachePager, CacheView, LoadState, MoviePager, PageKey, PagedList};

/// External triggers the repository reacts to.
#[derive(Debug, Clone)]
pub enum Trigger {
  InitialLoad,
  QueryChanged(String),
  ManualRefresh,
  /// Re-run whatever trigger last failed.
  Retry,
}

/// Where the currently displayed items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
  Network,
  Cache,
}

/// What the presentation boundary shows; exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
  ShowingShimmer,
  ShowingList,
  ShowingEmptyMessage,
  ShowingErrorMessage,
  ShowingOfflineMessage,
}

/// Pure derivation of the visible state.
///
/// Error and offline take precedence over empty and are mutually exclusive
/// with each other (error wins while the load state holds one). The
/// offline message is suppressed while a search is active so an in-flight
/// search is never mislabeled as "no network and no cache".
pub fn derive_ui_state(
  online: bool,
  load_state: &LoadState,
  item_count: usize,
  searching: bool,
) -> UiState {
  match load_state {
    LoadState::Loading => UiState::ShowingShimmer,
    LoadState::Error(_) => UiState::ShowingErrorMessage,
    LoadState::Idle | LoadState::Loaded { .. } => {
      if item_count > 0 {
        UiState::ShowingList
      } else if !online && !searching {
        UiState::ShowingOfflineMessage
      } else {
        UiState::ShowingEmptyMessage
      }
    }
  }
}

/// One published view of the active list.
#[derive(Debug, Clone)]
pub struct ListSnapshot {
  /// Effective query (blank input already mapped to the default term).
  pub query: String,
  pub movies: Vec<Movie>,
  pub total_results: Option<u32>,
  pub load_state: LoadState,
  pub online: bool,
  pub searching: bool,
  pub source: DataSource,
}

impl ListSnapshot {
  fn initial(query: &str) -> Self {
    Self {
      query: query.to_string(),
      movies: Vec::new(),
      total_results: None,
      load_state: LoadState::Idle,
      online: true,
      searching: false,
      source: DataSource::Network,
    }
  }

  pub fn ui_state(&self) -> UiState {
    derive_ui_state(
      self.online,
      &self.load_state,
      self.movies.len(),
      self.searching,
    )
  }
}

enum SessionKind {
  Network,
  Cache(CachePager),
}

/// State of the active loading session. Recreated on every trigger.
struct Session {
  gen: u64,
  query: String,
  searching: bool,
  kind: SessionKind,
  list: PagedList,
  handle: Option<JoinHandle<()>>,
}

impl Session {
  fn idle(query: &str) -> Self {
    Self {
      gen: 0,
      query: query.to_string(),
      searching: false,
      kind: SessionKind::Network,
      list: PagedList::new(),
      handle: None,
    }
  }
}

/// The sync orchestrator.
#[derive(Clone)]
pub struct MovieRepository {
  api: Arc<dyn SearchApi>,
  store: Arc<dyn MovieStore>,
  connectivity: Arc<dyn Connectivity>,
  default_query: String,
  page_size: usize,
  snapshot: Arc<watch::Sender<ListSnapshot>>,
  session: Arc<Mutex<Session>>,
  generation: Arc<AtomicU64>,
  last_trigger: Arc<std::sync::Mutex<Trigger>>,
}

impl MovieRepository {
  pub fn new(
    api: Arc<dyn SearchApi>,
    store: Arc<dyn MovieStore>,
    connectivity: Arc<dyn Connectivity>,
    default_query: impl Into<String>,
    page_size: usize,
  ) -> Self {
    let default_query = default_query.into();
    let (snapshot, _) = watch::channel(ListSnapshot::initial(&default_query));

    Self {
      api,
      store,
      connectivity,
      session: Arc::new(Mutex::new(Session::idle(&default_query))),
      default_query,
      page_size,
      snapshot: Arc::new(snapshot),
      generation: Arc::new(AtomicU64::new(0)),
      last_trigger: Arc::new(std::sync::Mutex::new(Trigger::InitialLoad)),
    }
  }

  /// Stream of list snapshots for the presentation boundary.
  pub fn subscribe(&self) -> watch::Receiver<ListSnapshot> {
    self.snapshot.subscribe()
  }

  /// Report the item position the user is currently viewing, so a manual
  /// refresh can anchor to the page containing it.
  pub async fn set_anchor(&self, position: usize) {
    self.session.lock().await.list.set_anchor(position);
  }

  /// Handle one trigger according to the orchestration policy.
  pub async fn dispatch(&self, trigger: Trigger) {
    // Retry replays the trigger that produced the failed load.
    let trigger = match trigger {
      Trigger::Retry => self.last_trigger.lock().expect("trigger lock").clone(),
      t => {
        *self.last_trigger.lock().expect("trigger lock") = t.clone();
        t
      }
    };

    let online = self.connectivity.is_online();
    tracing::debug!(?trigger, online, "dispatching");

    match trigger {
      Trigger::InitialLoad => {
        if online {
          self
            .start_network(self.default_query.clone(), false, None)
            .await;
        } else {
          // No default fetch offline; show whatever the cache holds.
          self.serve_cache(CacheView::All, false, online).await;
        }
      }
      Trigger::QueryChanged(raw) => {
        let searching = !raw.is_empty();
        let query = if raw.is_empty() {
          self.default_query.clone()
        } else {
          raw
        };

        if online {
          self.start_network(query, searching, None).await;
        } else if searching {
          self
            .serve_cache(CacheView::ByQuery(query), searching, online)
            .await;
        } else {
          self.serve_cache(CacheView::All, searching, online).await;
        }
      }
      Trigger::ManualRefresh => {
        if online {
          let (query, searching, key) = {
            let session = self.session.lock().await;
            (
              session.query.clone(),
              session.searching,
              session.list.refresh_key(),
            )
          };
          self.start_network(query, searching, key).await;
        } else if self.snapshot.borrow().movies.is_empty() {
          // Offline with nothing displayed: a distinct terminal state, not
          // an error, and no doomed network call.
          let query = self.session.lock().await.query.clone();
          self.snapshot.send_replace(ListSnapshot {
            query,
            movies: Vec::new(),
            total_results: None,
            load_state: LoadState::Loaded {
              count: 0,
              end_of_data: true,
            },
            online: false,
            searching: false,
            source: DataSource::Cache,
          });
        } else {
          self.serve_cache(CacheView::All, false, online).await;
        }
      }
      Trigger::Retry => unreachable!("retry resolved above"),
    }
  }

  /// Load the next page of the current session, strictly sequentially. A
  /// no-op while a load is already in flight or the sequence has ended.
  pub async fn load_more(&self) {
    let mut session = self.session.lock().await;
    if session.handle.is_some() || session.list.end_of_data() {
      return;
    }

    let gen = session.gen;
    let key = session.list.next_key();

    let cache_pager = match &session.kind {
      SessionKind::Cache(pager) => Some(pager.clone()),
      SessionKind::Network => None,
    };

    if let Some(pager) = cache_pager {
      // Store reads are local and fast; advance inline.
      match pager.load(key) {
        Ok(page) => {
          session.list.push(page);
          let snap = self.cache_snapshot(&session);
          self.snapshot.send_replace(snap);
        }
        Err(e) => {
          tracing::warn!(error = %e, "cache page read failed");
        }
      }
    } else {
      let query = session.query.clone();
      let searching = session.searching;

      // Keep the loaded items visible while the next page arrives.
      self.snapshot.send_replace(ListSnapshot {
        query: query.clone(),
        movies: session.list.to_vec(),
        total_results: session.list.total_results(),
        load_state: LoadState::Loading,
        online: true,
        searching,
        source: DataSource::Network,
      });

      session.handle = Some(self.spawn_page_load(gen, query, searching, key));
    }
  }

  /// Start a fresh network session, superseding whatever was in flight.
  async fn start_network(&self, query: String, searching: bool, start_key: Option<PageKey>) {
    let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

    let mut session = self.session.lock().await;
    if let Some(handle) = session.handle.take() {
      // Cancel, not merely ignore: the superseded fetch stops running.
      handle.abort();
    }
    session.gen = gen;
    session.query = query.clone();
    session.searching = searching;
    session.kind = SessionKind::Network;
    session.list = PagedList::new();

    // New search clears the list and shows the shimmer.
    self.snapshot.send_replace(ListSnapshot {
      query: query.clone(),
      movies: Vec::new(),
      total_results: None,
      load_state: LoadState::Loading,
      online: true,
      searching,
      source: DataSource::Network,
    });

    session.handle = Some(self.spawn_page_load(gen, query, searching, start_key));
  }

  fn spawn_page_load(
    &self,
    gen: u64,
    query: String,
    searching: bool,
    key: Option<PageKey>,
  ) -> JoinHandle<()> {
    let api = Arc::clone(&self.api);
    let store = Arc::clone(&self.store);
    let session = Arc::clone(&self.session);
    let snapshot = Arc::clone(&self.snapshot);

    tokio::spawn(async move {
      let pager = MoviePager::new(api, store, query.clone());
      let result = pager.load(key).await;

      let mut session = session.lock().await;
      if session.gen != gen {
        // Superseded while in flight; a newer session owns the snapshot now.
        return;
      }
      session.handle = None;

      match result {
        Ok(page) => {
          session.list.push(page);
          snapshot.send_replace(ListSnapshot {
            query,
            movies: session.list.to_vec(),
            total_results: session.list.total_results(),
            load_state: LoadState::Loaded {
              count: session.list.item_count(),
              end_of_data: session.list.end_of_data(),
            },
            online: true,
            searching,
            source: DataSource::Network,
          });
        }
        Err(e) => {
          tracing::warn!(query = %query, error = %e, "page load failed");
          snapshot.send_replace(ListSnapshot {
            query,
            movies: session.list.to_vec(),
            total_results: session.list.total_results(),
            load_state: LoadState::Error(Arc::new(e)),
            online: true,
            searching,
            source: DataSource::Network,
          });
        }
      }
    })
  }

  /// Serve the first cache page as the active session (offline path).
  async fn serve_cache(&self, view: CacheView, searching: bool, online: bool) {
    let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

    let mut session = self.session.lock().await;
    if let Some(handle) = session.handle.take() {
      handle.abort();
    }

    let query = match &view {
      CacheView::ByQuery(q) => q.clone(),
      CacheView::All => self.default_query.clone(),
    };
    let pager = CachePager::new(Arc::clone(&self.store), view, self.page_size);

    session.gen = gen;
    session.query = query.clone();
    session.searching = searching;
    session.list = PagedList::new();

    match pager.load(None) {
      Ok(page) => {
        session.kind = SessionKind::Cache(pager);
        session.list.push(page);
        let mut snap = self.cache_snapshot(&session);
        snap.online = online;
        self.snapshot.send_replace(snap);
      }
      Err(e) => {
        // The cache is the serving source here, so its failure is the
        // load's failure.
        session.kind = SessionKind::Cache(pager);
        self.snapshot.send_replace(ListSnapshot {
          query,
          movies: Vec::new(),
          total_results: None,
          load_state: LoadState::Error(Arc::new(e)),
          online,
          searching,
          source: DataSource::Cache,
        });
      }
    }
  }

  fn cache_snapshot(&self, session: &Session) -> ListSnapshot {
    ListSnapshot {
      query: session.query.clone(),
      movies: session.list.to_vec(),
      total_results: None,
      load_state: LoadState::Loaded {
        count: session.list.item_count(),
        end_of_data: session.list.end_of_data(),
      },
      online: false,
      searching: session.searching,
      source: DataSource::Cache,
    }
  }

  /// Observe cache writes and surface cached rows while no newer network
  /// data is showing. While a search is in flight the observer stays
  /// silent; it regains authority once searching stops.
  pub fn spawn_cache_observer(&self) -> JoinHandle<()> {
    let store = Arc::clone(&self.store);
    let connectivity = Arc::clone(&self.connectivity);
    let session = Arc::clone(&self.session);
    let snapshot = Arc::clone(&self.snapshot);

    tokio::spawn(async move {
      let mut version = store.subscribe();

      loop {
        {
          let session = session.lock().await;
          let suppressed = session.searching
            || !session.list.is_empty()
            || snapshot.borrow().load_state.is_error();

          if !suppressed {
            let online = connectivity.is_online();
            match read_all(store.as_ref()) {
              Ok(movies) => {
                // An empty cache only matters offline, where it drives the
                // offline message; online it would clobber the shimmer.
                if !movies.is_empty() || !online {
                  snapshot.send_replace(ListSnapshot {
                    query: session.query.clone(),
                    total_results: None,
                    load_state: LoadState::Loaded {
                      count: movies.len(),
                      end_of_data: true,
                    },
                    movies,
                    online,
                    searching: false,
                    source: DataSource::Cache,
                  });
                }
              }
              Err(e) => {
                // Degrade: treat the cache as empty, keep the pipeline alive.
                tracing::warn!(error = %e, "cache observer read failed");
              }
            }
          }
        }

        if version.changed().await.is_err() {
          break;
        }
      }
    })
  }
}

fn read_all(store: &dyn MovieStore) -> Result<Vec<Movie>, LoadError> {
  let count = store.count_all()?;
  Ok(store.all(count.max(1), 0)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStore;
  use crate::connectivity::Fixed;
  use crate::error::StoreError;
  use crate::omdb::SearchPage;
  use async_trait::async_trait;
  use std::collections::HashMap;
  use std::time::Duration;
  use tokio::sync::Semaphore;
  use tokio::time::timeout;

  fn movie(id: &str, title: &str) -> Movie {
    Movie {
      imdb_id: id.to_string(),
      title: title.to_string(),
      kind: "movie".to_string(),
      year: "2008".to_string(),
      poster: None,
    }
  }

  #[derive(Clone)]
  enum Canned {
    Page(Vec<Movie>, Option<u32>),
    ApiError(String),
  }

  /// Scripted remote source: canned responses per (query, page), an
  /// optional per-query gate to hold a response in flight, and a call log.
  struct FakeApi {
    responses: HashMap<(String, u32), Canned>,
    gates: HashMap<String, Arc<Semaphore>>,
    calls: std::sync::Mutex<Vec<(String, u32)>>,
  }

  impl FakeApi {
    fn new() -> Self {
      Self {
        responses: HashMap::new(),
        gates: HashMap::new(),
        calls: std::sync::Mutex::new(Vec::new()),
      }
    }

    fn page(mut self, query: &str, page: u32, movies: Vec<Movie>, total: Option<u32>) -> Self {
      self
        .responses
        .insert((query.to_string(), page), Canned::Page(movies, total));
      self
    }

    fn api_error(mut self, query: &str, page: u32, message: &str) -> Self {
      self
        .responses
        .insert((query.to_string(), page), Canned::ApiError(message.to_string()));
      self
    }

    /// Hold responses for `query` until the returned gate gets a permit.
    fn gated(mut self, query: &str) -> (Self, Arc<Semaphore>) {
      let gate = Arc::new(Semaphore::new(0));
      self.gates.insert(query.to_string(), Arc::clone(&gate));
      (self, gate)
    }

    fn calls(&self) -> Vec<(String, u32)> {
      self.calls.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl SearchApi for FakeApi {
    async fn search_movies(&self, query: &str, page: u32) -> Result<SearchPage, LoadError> {
      self
        .calls
        .lock()
        .unwrap()
        .push((query.to_string(), page));

      if let Some(gate) = self.gates.get(query) {
        let _permit = gate.acquire().await.expect("gate closed");
      }

      match self.responses.get(&(query.to_string(), page)) {
        Some(Canned::Page(movies, total)) => Ok(SearchPage {
          movies: movies.clone(),
          total_results: *total,
        }),
        Some(Canned::ApiError(message)) => Err(LoadError::Api(message.clone())),
        None => Ok(SearchPage {
          movies: vec![],
          total_results: None,
        }),
      }
    }
  }

  struct FailingStore;

  impl MovieStore for FailingStore {
    fn save(&self, _q: &str, _m: &[Movie]) -> Result<(), StoreError> {
      Err(StoreError::Poisoned)
    }
    fn by_query(&self, _q: &str, _l: usize, _o: usize) -> Result<Vec<Movie>, StoreError> {
      Err(StoreError::Poisoned)
    }
    fn all(&self, _l: usize, _o: usize) -> Result<Vec<Movie>, StoreError> {
      Err(StoreError::Poisoned)
    }
    fn count_all(&self) -> Result<usize, StoreError> {
      Err(StoreError::Poisoned)
    }
    fn synced_at(&self, _q: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>, StoreError> {
      Err(StoreError::Poisoned)
    }
    fn subscribe(&self) -> watch::Receiver<u64> {
      let (tx, rx) = watch::channel(0);
      std::mem::forget(tx);
      rx
    }
  }

  fn repo(
    api: FakeApi,
    store: Arc<dyn MovieStore>,
    online: bool,
  ) -> (MovieRepository, Arc<FakeApi>) {
    let api = Arc::new(api);
    let repo = MovieRepository::new(
      Arc::clone(&api) as Arc<dyn SearchApi>,
      store,
      Arc::new(Fixed(online)),
      "batman",
      10,
    );
    (repo, api)
  }

  /// Wait until the published snapshot satisfies `pred`.
  async fn wait_for<F>(rx: &mut watch::Receiver<ListSnapshot>, mut pred: F) -> ListSnapshot
  where
    F: FnMut(&ListSnapshot) -> bool,
  {
    timeout(Duration::from_secs(2), async {
      loop {
        if pred(&rx.borrow()) {
          return rx.borrow().clone();
        }
        rx.changed().await.expect("snapshot channel closed");
      }
    })
    .await
    .expect("snapshot never satisfied predicate")
  }

  #[tokio::test]
  async fn initial_load_happy_path() {
    let movies = vec![movie("tt1", "Batman Begins"), movie("tt2", "The Batman")];
    let api = FakeApi::new().page("batman", 1, movies.clone(), Some(2));
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, _) = repo(api, store.clone(), true);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::InitialLoad).await;

    let snap = wait_for(&mut rx, |s| !s.load_state.is_loading() && !s.movies.is_empty()).await;
    assert_eq!(snap.movies, movies);
    assert_eq!(snap.total_results, Some(2));
    assert!(matches!(snap.load_state, LoadState::Loaded { count: 2, .. }));
    assert_eq!(snap.ui_state(), UiState::ShowingList);

    // Side effect: fetched items cached under the effective query
    assert_eq!(store.by_query("batman", 50, 0).unwrap().len(), 2);
  }

  #[tokio::test]
  async fn logical_failure_surfaces_as_error_state() {
    let api = FakeApi::new().api_error("batman", 1, "Movie not found!");
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, _) = repo(api, store.clone(), true);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::InitialLoad).await;

    let snap = wait_for(&mut rx, |s| s.load_state.is_error()).await;
    assert_eq!(
      snap.load_state.error().unwrap().to_string(),
      "Movie not found!"
    );
    assert_eq!(snap.ui_state(), UiState::ShowingErrorMessage);
    assert_eq!(store.count_all().unwrap(), 0);
  }

  #[tokio::test]
  async fn blank_query_maps_to_default_term() {
    let api = FakeApi::new().page("batman", 1, vec![movie("tt1", "Batman Begins")], None);
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, api) = repo(api, store, true);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::QueryChanged(String::new())).await;

    let snap = wait_for(&mut rx, |s| !s.load_state.is_loading()).await;
    assert_eq!(snap.query, "batman");
    assert!(!snap.searching);
    assert_eq!(api.calls(), vec![("batman".to_string(), 1)]);
  }

  #[tokio::test]
  async fn new_query_supersedes_stale_in_flight_results() {
    let (api, gate) = FakeApi::new()
      .page("superman", 1, vec![movie("tt9", "Superman Returns")], None)
      .page("batman", 1, vec![movie("tt1", "The Batman")], None)
      .gated("superman");
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, _) = repo(api, store, true);
    let mut rx = repo.subscribe();

    repo
      .dispatch(Trigger::QueryChanged("superman".to_string()))
      .await;
    repo
      .dispatch(Trigger::QueryChanged("batman".to_string()))
      .await;

    let snap = wait_for(&mut rx, |s| !s.movies.is_empty()).await;
    assert_eq!(snap.query, "batman");
    assert_eq!(snap.movies[0].title, "The Batman");

    // Release the stale fetch; it must not overwrite the newer state.
    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let current = rx.borrow().clone();
    assert_eq!(current.query, "batman");
    assert_eq!(current.movies[0].title, "The Batman");
  }

  #[tokio::test]
  async fn load_more_appends_sequentially_and_stops_at_end() {
    let api = FakeApi::new()
      .page("batman", 1, vec![movie("tt1", "Batman Begins")], Some(2))
      .page("batman", 2, vec![movie("tt2", "The Batman")], Some(2))
      .page("batman", 3, vec![], None);
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, api) = repo(api, store, true);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::InitialLoad).await;
    wait_for(&mut rx, |s| matches!(s.load_state, LoadState::Loaded { count: 1, .. })).await;

    repo.load_more().await;
    let snap =
      wait_for(&mut rx, |s| matches!(s.load_state, LoadState::Loaded { count: 2, .. })).await;
    assert_eq!(snap.movies.len(), 2);

    // Page 3 is empty: end of data
    repo.load_more().await;
    let snap = wait_for(&mut rx, |s| {
      matches!(
        s.load_state,
        LoadState::Loaded {
          end_of_data: true,
          ..
        }
      )
    })
    .await;
    assert_eq!(snap.movies.len(), 2);

    // No page 4 request once the sequence terminated
    repo.load_more().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
      api.calls(),
      vec![
        ("batman".to_string(), 1),
        ("batman".to_string(), 2),
        ("batman".to_string(), 3),
      ]
    );
  }

  #[tokio::test]
  async fn manual_refresh_restarts_from_the_anchored_page() {
    let api = FakeApi::new()
      .page("batman", 1, vec![movie("tt1", "A"), movie("tt2", "B")], None)
      .page("batman", 2, vec![movie("tt3", "C"), movie("tt4", "D")], None);
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, api) = repo(api, store, true);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::InitialLoad).await;
    wait_for(&mut rx, |s| matches!(s.load_state, LoadState::Loaded { count: 2, .. })).await;
    repo.load_more().await;
    wait_for(&mut rx, |s| matches!(s.load_state, LoadState::Loaded { count: 4, .. })).await;

    // User is viewing an item inside page 2
    repo.set_anchor(2).await;
    repo.dispatch(Trigger::ManualRefresh).await;
    wait_for(&mut rx, |s| {
      !s.load_state.is_loading() && s.movies.len() == 2
    })
    .await;

    assert_eq!(api.calls().last().unwrap(), &("batman".to_string(), 2));
  }

  #[tokio::test]
  async fn offline_refresh_with_no_data_shows_offline_and_skips_network() {
    let api = FakeApi::new();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, api) = repo(api, store, false);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::ManualRefresh).await;

    let snap = wait_for(&mut rx, |s| !s.online).await;
    assert_eq!(snap.ui_state(), UiState::ShowingOfflineMessage);
    assert!(api.calls().is_empty());
  }

  #[tokio::test]
  async fn offline_refresh_with_displayed_data_serves_the_cache() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
      .save("batman", &[movie("tt1", "Batman Begins")])
      .unwrap();

    let (repo, api) = repo(FakeApi::new(), store, false);
    let mut rx = repo.subscribe();

    // Cache observer puts the cached rows on screen first
    let observer = repo.spawn_cache_observer();
    wait_for(&mut rx, |s| !s.movies.is_empty()).await;

    repo.dispatch(Trigger::ManualRefresh).await;
    let snap = wait_for(&mut rx, |s| s.source == DataSource::Cache && !s.movies.is_empty()).await;

    assert_eq!(snap.ui_state(), UiState::ShowingList);
    assert_eq!(snap.movies[0].imdb_id, "tt1");
    assert!(api.calls().is_empty());

    observer.abort();
  }

  #[tokio::test]
  async fn offline_query_change_serves_cache_by_query() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
      .save(
        "batman",
        &[movie("tt1", "Batman Begins"), movie("tt2", "Superman Returns")],
      )
      .unwrap();

    let (repo, api) = repo(FakeApi::new(), store, false);
    let mut rx = repo.subscribe();

    repo
      .dispatch(Trigger::QueryChanged("Superman".to_string()))
      .await;

    let snap = wait_for(&mut rx, |s| s.source == DataSource::Cache).await;
    assert_eq!(snap.movies.len(), 1);
    assert_eq!(snap.movies[0].title, "Superman Returns");
    assert!(snap.searching);
    assert!(api.calls().is_empty());
  }

  #[tokio::test]
  async fn cache_observer_stays_silent_while_searching() {
    let (api, gate) = FakeApi::new()
      .page("superman", 1, vec![movie("tt9", "Superman Returns")], None)
      .gated("superman");
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
      .save("batman", &[movie("tt1", "Batman Begins")])
      .unwrap();

    let (repo, _) = repo(api, store.clone(), true);
    let mut rx = repo.subscribe();
    let observer = repo.spawn_cache_observer();

    // Search in flight: observer must not override the shimmer
    repo
      .dispatch(Trigger::QueryChanged("superman".to_string()))
      .await;
    wait_for(&mut rx, |s| s.load_state.is_loading() && s.searching).await;

    // A cache write lands while the search is still in flight
    store
      .save("batman", &[movie("tt2", "Batman Returns")])
      .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.borrow().load_state.is_loading());
    assert_eq!(rx.borrow().source, DataSource::Network);

    // Search completes with its own results, not the cache's
    gate.add_permits(1);
    let snap = wait_for(&mut rx, |s| !s.load_state.is_loading()).await;
    assert_eq!(snap.movies[0].title, "Superman Returns");

    observer.abort();
  }

  #[tokio::test]
  async fn cache_observer_shows_cached_rows_before_network_answers() {
    let (api, _gate) = FakeApi::new().gated("batman");
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
      .save("batman", &[movie("tt1", "Batman Begins")])
      .unwrap();

    let (repo, _) = repo(api, store, true);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::InitialLoad).await;
    wait_for(&mut rx, |s| s.load_state.is_loading()).await;

    // Observer starts after the fetch is already in flight; cached rows
    // still become visible because the session has no data yet.
    let observer = repo.spawn_cache_observer();
    let snap = wait_for(&mut rx, |s| !s.movies.is_empty()).await;
    assert_eq!(snap.source, DataSource::Cache);
    assert_eq!(snap.movies[0].title, "Batman Begins");

    observer.abort();
  }

  #[tokio::test]
  async fn retry_replays_the_failed_trigger() {
    let api = FakeApi::new().api_error("batman", 1, "Movie not found!");
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (repo, api) = repo(api, store, true);
    let mut rx = repo.subscribe();

    repo.dispatch(Trigger::InitialLoad).await;
    wait_for(&mut rx, |s| s.load_state.is_error()).await;

    repo.dispatch(Trigger::Retry).await;
    wait_for(&mut rx, |s| s.load_state.is_error()).await;

    assert_eq!(
      api.calls(),
      vec![("batman".to_string(), 1), ("batman".to_string(), 1)]
    );
  }

  #[tokio::test]
  async fn offline_cache_failure_surfaces_as_error() {
    let (repo, _) = repo(FakeApi::new(), Arc::new(FailingStore), false);
    let mut rx = repo.subscribe();

    repo
      .dispatch(Trigger::QueryChanged("batman".to_string()))
      .await;

    let snap = wait_for(&mut rx, |s| s.load_state.is_error()).await;
    assert!(matches!(
      snap.load_state.error(),
      Some(LoadError::Cache(_))
    ));
    assert_eq!(snap.ui_state(), UiState::ShowingErrorMessage);
  }

  #[test]
  fn ui_state_truth_table() {
    use LoadState::*;

    let loaded = |count| Loaded {
      count,
      end_of_data: false,
    };

    assert_eq!(
      derive_ui_state(true, &Loading, 0, false),
      UiState::ShowingShimmer
    );
    assert_eq!(
      derive_ui_state(true, &loaded(2), 2, false),
      UiState::ShowingList
    );
    assert_eq!(
      derive_ui_state(true, &loaded(0), 0, true),
      UiState::ShowingEmptyMessage
    );
    assert_eq!(
      derive_ui_state(
        false,
        &Error(Arc::new(LoadError::Api("nope".to_string()))),
        0,
        false
      ),
      UiState::ShowingErrorMessage
    );
    assert_eq!(
      derive_ui_state(false, &loaded(0), 0, false),
      UiState::ShowingOfflineMessage
    );
    // Offline with data still shows the list
    assert_eq!(
      derive_ui_state(false, &loaded(3), 3, false),
      UiState::ShowingList
    );
    // Offline while searching is not "no network and no cache"
    assert_eq!(
      derive_ui_state(false, &loaded(0), 0, true),
      UiState::ShowingEmptyMessage
    );
    assert_eq!(derive_ui_state(true, &Idle, 0, false), UiState::ShowingEmptyMessage);
  }
}
