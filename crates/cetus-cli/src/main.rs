//! cetus admin binary.
//!
//! Reads `cetus.toml` (or the path specified with `--config`), opens the
//! SQLite incident store and runs one maintenance command against it: editing
//! the taxon and gear hierarchies, or inspecting, merging and recomputing
//! cases.
//!
//! ```
//! cargo run -p cetus-cli -- taxon add Megaptera --rank genus
//! cargo run -p cetus-cli -- cases recompute
//! ```

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use cetus_store_sqlite::SqliteStore;
use clap::Parser;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

#[derive(Parser)]
#[command(author, version, about = "Cetus incident store administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "cetus.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Debug, Clone, Deserialize)]
struct AdminConfig {
  /// Path to the SQLite database. `~/` is expanded.
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
}

fn default_store_path() -> PathBuf { PathBuf::from("cetus.db") }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("CETUS"))
    .build()
    .context("failed to read config file")?;

  let admin_cfg: AdminConfig = settings
    .try_deserialize()
    .context("failed to deserialise AdminConfig")?;

  let store_path = expand_tilde(&admin_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let mut stdout = std::io::stdout().lock();
  commands::run(&store, cli.command, &mut stdout).await
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
