//! `frames`: operator front end for a frames database.
//!
//! # Usage
//!
//! ```text
//! frames --versions base,variant dump gear
//! frames --versions base set gear color red
//! frames versions add variant --requires base
//! frames --config ~/.config/frames.toml find color=red size=10
//! ```

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use frames_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATABASE: &str = "frames.db";
const DEFAULT_USER: &str = "frames";

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "frames", version, about = "Versioned frames-and-slots store")]
struct Cli {
  /// Path to a TOML config file (database, user, versions).
  #[arg(short, long, value_name = "FILE", default_value = "frames.toml")]
  config: PathBuf,

  /// SQLite database file (default: frames.db).
  #[arg(long, value_name = "FILE")]
  database: Option<PathBuf>,

  /// User recorded on every write.
  #[arg(long)]
  user: Option<String>,

  /// Active versions, comma separated.
  #[arg(long, value_delimiter = ',')]
  versions: Vec<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print every visible slot of a frame.
  Dump {
    /// Frame id or frame name.
    frame: String,
  },
  /// Print a frame's own slot rows as JSON, without inheritance.
  Raw { frame: String },
  /// List frames whose slots match every NAME=VALUE (`*` matches anything).
  Find {
    #[arg(required = true, value_name = "NAME=VALUE")]
    criteria: Vec<String>,
  },
  /// Create a frame. Repeating a name makes a list.
  Create {
    #[arg(value_name = "NAME=VALUE")]
    slots: Vec<String>,
  },
  /// Set a slot. More than one value (or `--list`) writes a list.
  Set {
    frame:       String,
    name:        String,
    #[arg(required = true)]
    values:      Vec<String>,
    #[arg(long)]
    list:        bool,
    #[arg(long)]
    description: Option<String>,
  },
  /// Delete a slot, shadowing any inherited value.
  Delete { frame: String, name: String },
  /// Inspect and manage versions.
  Versions {
    #[command(subcommand)]
    action: VersionAction,
  },
}

#[derive(Subcommand, Debug)]
enum VersionAction {
  List,
  Add {
    name:        String,
    /// Versions the new one requires, comma separated.
    #[arg(long, value_delimiter = ',')]
    requires:    Vec<String>,
    #[arg(long)]
    description: Option<String>,
  },
  /// Freeze a version against further writes.
  Finalize { name: String },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional config file and `FRAMES_*` environment.
#[derive(Deserialize, Default, Debug)]
struct CliConfig {
  #[serde(default)]
  database: Option<PathBuf>,
  #[serde(default)]
  user:     Option<String>,
  #[serde(default)]
  versions: Vec<String>,
}

fn load_config(path: &Path) -> Result<CliConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("FRAMES")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("versions"),
    )
    .build()
    .context("failed to read config file")?;
  settings.try_deserialize().context("failed to deserialise CliConfig")
}

// ─── Entry point ──────────────────────────────────────────────────────────────

/// Resolved settings for one invocation.
pub struct Settings {
  pub user:     String,
  pub versions: Vec<String>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let file_cfg = load_config(&cli.config)?;

  // CLI flags override config, which overrides defaults.
  let database = cli.database.or(file_cfg.database).unwrap_or_else(|| DEFAULT_DATABASE.into());
  let settings = Settings {
    user:     cli.user.or(file_cfg.user).unwrap_or_else(|| DEFAULT_USER.to_owned()),
    versions: if cli.versions.is_empty() { file_cfg.versions } else { cli.versions },
  };

  let store = SqliteStore::open(&database)
    .with_context(|| format!("failed to open database at {}", database.display()))?;

  match cli.command {
    Command::Dump { frame } => commands::dump(&store, &settings, &frame),
    Command::Raw { frame } => commands::raw(&store, &settings, &frame),
    Command::Find { criteria } => commands::find(&store, &settings, &criteria),
    Command::Create { slots } => commands::create(&store, &settings, &slots),
    Command::Set { frame, name, values, list, description } => {
      commands::set(&store, &settings, &frame, &name, values, list, description)
    }
    Command::Delete { frame, name } => commands::delete(&store, &settings, &frame, &name),
    Command::Versions { action } => match action {
      VersionAction::List => commands::list_versions(&store),
      VersionAction::Add { name, requires, description } => {
        commands::add_version(&store, &settings, name, requires, description)
      }
      VersionAction::Finalize { name } => commands::finalize_version(&store, &settings, &name),
    },
  }
}
