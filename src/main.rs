mod app;
mod cache;
mod config;
mod connectivity;
mod error;
mod omdb;
mod paging;
mod repo;
mod search;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cache::{MovieStore, NoopStore, SqliteStore};
use connectivity::{Connectivity, Fixed, TcpProbe};
use omdb::{OmdbClient, SearchApi};
use repo::MovieRepository;

#[derive(Parser, Debug)]
#[command(name = "flick")]
#[command(about = "Search movies on OMDb, with an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/flick/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Run one search and exit instead of starting the interactive prompt
  #[arg(short, long)]
  query: Option<String>,

  /// Skip the connectivity probe and treat the network as unavailable
  #[arg(long)]
  offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;

  let client = OmdbClient::new(&config)?;

  let connectivity: Arc<dyn Connectivity> = if args.offline {
    Arc::new(Fixed(false))
  } else {
    let host = client
      .host()
      .unwrap_or_else(|| "www.omdbapi.com".to_string());
    Arc::new(TcpProbe::https(host))
  };

  let store: Arc<dyn MovieStore> = if config.cache.enabled {
    match &config.cache.path {
      Some(path) => Arc::new(SqliteStore::open(path)?),
      None => Arc::new(SqliteStore::open_default()?),
    }
  } else {
    Arc::new(NoopStore::new())
  };

  let repo = MovieRepository::new(
    Arc::new(client) as Arc<dyn SearchApi>,
    Arc::clone(&store),
    connectivity,
    config.default_query.clone(),
    config.page_size,
  );

  match args.query {
    Some(query) => app::one_shot(repo, query).await,
    None => app::App::new(repo, store, config.debounce()).run().await,
  }
}
