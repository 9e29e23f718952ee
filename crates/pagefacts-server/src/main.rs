//! pagefacts server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `PAGEFACTS_*` environment variables, opens the SQLite store, and either
//! serves the JSON API or rebuilds the store from exported page documents.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pagefacts_server::{ServerConfig, app_state, rebuild, router, schemas::DirSchemaSource};
use pagefacts_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "pagefacts structured data server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API (default).
  Serve,
  /// Re-record every page document found in a directory.
  Rebuild {
    /// Directory of `*.json` page documents.
    pages: PathBuf,
    /// Skip this many documents (in file name order).
    #[arg(long, default_value_t = 0)]
    skip:  usize,
    /// Stop after this many documents.
    #[arg(long)]
    limit: Option<usize>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PAGEFACTS"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let schema_dir = expand_tilde(&server_cfg.schema_dir);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => {
      let app = router(app_state(store, schema_dir));
      let address = format!("{}:{}", server_cfg.host, server_cfg.port);

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

      axum::serve(listener, app).await.context("server error")?;
    }
    Command::Rebuild { pages, skip, limit } => {
      let schemas = DirSchemaSource::new(schema_dir);
      let stats = rebuild::rebuild(&store, &schemas, &expand_tilde(&pages), skip, limit)
        .await
        .context("rebuild failed")?;
      println!(
        "{} pages, {} facts, {} warnings, {} missing schemas",
        stats.pages, stats.facts, stats.warnings, stats.missing_schemas
      );
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
