//! Interactive prompt: the presentation boundary.
//!
//! Typed lines feed the debounced search input; slash commands map to the
//! repository triggers. Every published snapshot renders as exactly one of
//! the five derived states.

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cache::MovieStore;
use crate::paging::LoadState;
use crate::repo::{DataSource, ListSnapshot, MovieRepository, Trigger, UiState};
use crate::search::SearchInput;

pub struct App {
  repo: MovieRepository,
  store: Arc<dyn MovieStore>,
  debounce: Duration,
}

impl App {
  pub fn new(repo: MovieRepository, store: Arc<dyn MovieStore>, debounce: Duration) -> Self {
    Self {
      repo,
      store,
      debounce,
    }
  }

  pub async fn run(self) -> Result<()> {
    let App {
      repo,
      store,
      debounce,
    } = self;

    let (input, mut queries) = SearchInput::new(debounce);
    let _observer = repo.spawn_cache_observer();
    let mut snapshots = repo.subscribe();

    println!("flick — type to search; /r refresh, /m more, /t retry, /c clear, /q quit");

    repo.dispatch(Trigger::InitialLoad).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
      tokio::select! {
        changed = snapshots.changed() => {
          if changed.is_err() {
            break;
          }
          let snapshot = snapshots.borrow().clone();
          let cached_at = if snapshot.source == DataSource::Cache {
            store.synced_at(&snapshot.query).ok().flatten()
          } else {
            None
          };
          render(&snapshot, cached_at);
        }
        query = queries.recv() => match query {
          Some(q) => repo.dispatch(Trigger::QueryChanged(q)).await,
          None => break,
        },
        line = lines.next_line() => match line? {
          None => break,
          Some(line) => match line.trim() {
            "/q" => break,
            "/r" => repo.dispatch(Trigger::ManualRefresh).await,
            "/m" => repo.load_more().await,
            "/t" => repo.dispatch(Trigger::Retry).await,
            "/c" => input.clear(),
            "" => input.changed(None),
            text => input.changed(Some(text.to_string())),
          },
        },
      }
    }

    Ok(())
  }
}

/// Run a single search to completion and print the result.
pub async fn one_shot(repo: MovieRepository, query: String) -> Result<()> {
  let mut snapshots = repo.subscribe();
  repo.dispatch(Trigger::QueryChanged(query)).await;

  loop {
    {
      let snapshot = snapshots.borrow();
      if matches!(
        snapshot.load_state,
        LoadState::Loaded { .. } | LoadState::Error(_)
      ) {
        render(&snapshot, None);
        return Ok(());
      }
    }
    if snapshots.changed().await.is_err() {
      return Ok(());
    }
  }
}

fn render(snapshot: &ListSnapshot, cached_at: Option<chrono::DateTime<chrono::Utc>>) {
  match snapshot.ui_state() {
    UiState::ShowingShimmer => {
      println!("… loading \"{}\"", snapshot.query);
    }
    UiState::ShowingList => {
      let heading = match (snapshot.source, snapshot.total_results) {
        (DataSource::Network, Some(total)) => {
          format!("\"{}\" — {} of {}", snapshot.query, snapshot.movies.len(), total)
        }
        (DataSource::Network, None) => {
          format!("\"{}\" — {} results", snapshot.query, snapshot.movies.len())
        }
        (DataSource::Cache, _) => match cached_at {
          Some(at) => format!(
            "\"{}\" — {} cached results (synced {})",
            snapshot.query,
            snapshot.movies.len(),
            at.format("%Y-%m-%d %H:%M")
          ),
          None => format!("\"{}\" — {} cached results", snapshot.query, snapshot.movies.len()),
        },
      };
      println!("{}", heading);
      for (i, movie) in snapshot.movies.iter().enumerate() {
        println!("{:>3}. {} ({}) [{}]", i + 1, movie.title, movie.year, movie.kind);
      }
    }
    UiState::ShowingEmptyMessage => {
      println!("No results for \"{}\"", snapshot.query);
    }
    UiState::ShowingErrorMessage => {
      let message = snapshot
        .load_state
        .error()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
      println!("Error: {} (/t to retry)", message);
    }
    UiState::ShowingOfflineMessage => {
      println!("You're offline and nothing is cached yet.");
    }
  }
}
