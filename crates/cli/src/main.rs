//! catalog - keep file catalogs in step with the directories they describe

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{
  StampArgs, cmd_audit, cmd_config_init, cmd_config_show, cmd_formalize, cmd_refresh, cmd_remove, cmd_replace,
  load_config,
};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Reconcile file catalogs against the directories they describe")]
#[command(after_help = "\
QUICK START:
  catalog refresh data/scan_catalog.json            # Add new files, refresh digests
  catalog refresh data/scan_catalog.json --remove   # Also drop entries for deleted files
  catalog audit data/scan_catalog.json              # Show the change ledger

MAINTENANCE:
  catalog formalize data/scan_catalog.json          # Backfill ids and provenance only
  catalog replace data/scan_catalog.json a.txt new.txt
  catalog remove data/scan_catalog.json a.txt")]
struct Cli {
  /// Log at debug level (RUST_LOG still wins)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `catalog config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show the effective configuration for a catalog directory
  Show {
    /// Catalog directory (default: current directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,
  },
  /// Write a default config to <dir>/.catalog/config.toml
  Init {
    /// Catalog directory (default: current directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Reconcile a catalog with its directory and save the changes
  #[command(after_help = "\
Defaults come from [refresh] in the catalog's config; flags override them.
The pass is refused if another catalog document sits next to this one.")]
  Refresh {
    /// Catalog document (.json or .json.gz); created if missing
    catalog: PathBuf,
    /// Drop entries whose file no longer exists
    #[arg(long)]
    remove: bool,
    /// Keep entries whose file no longer exists
    #[arg(long, conflicts_with = "remove")]
    keep_missing: bool,
    /// Don't add entries for unreferenced files
    #[arg(long)]
    no_add: bool,
    /// Don't recompute digests
    #[arg(long)]
    no_checksums: bool,
    /// Don't update stored file totals
    #[arg(long)]
    no_stats: bool,
    #[command(flatten)]
    stamp: StampArgs,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Backfill missing ids, provenance and digests without walking the directory
  Formalize {
    catalog: PathBuf,
    /// Compute digests that are blank
    #[arg(long)]
    checksums: bool,
    /// Drop entries whose file no longer exists
    #[arg(long)]
    remove: bool,
    #[command(flatten)]
    stamp: StampArgs,
  },
  /// Show the audit ledger of a catalog
  Audit {
    catalog: PathBuf,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Overwrite a cataloged file, archiving the old copy when history is enabled
  Replace {
    catalog: PathBuf,
    /// Entry URI, relative to the catalog's directory
    uri: String,
    /// File whose content replaces the entry's file
    source: PathBuf,
    #[command(flatten)]
    stamp: StampArgs,
  },
  /// Delete a cataloged file and its entry
  Remove {
    catalog: PathBuf,
    /// Entry URI, relative to the catalog's directory
    uri: String,
    #[command(flatten)]
    stamp: StampArgs,
  },
  /// Manage configuration
  #[command(after_help = "\
CONFIG LOCATIONS:
  Catalog: <catalog dir>/.catalog/config.toml
  User:    ~/.config/catalog/config.toml")]
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let config_dir = match &cli.command {
    Commands::Refresh { catalog, .. }
    | Commands::Formalize { catalog, .. }
    | Commands::Audit { catalog, .. }
    | Commands::Replace { catalog, .. }
    | Commands::Remove { catalog, .. } => reconcile::catalog_dir(catalog),
    Commands::Config { command } => match command {
      ConfigCommand::Show { dir } | ConfigCommand::Init { dir } => dir.clone().unwrap_or_else(|| PathBuf::from(".")),
    },
  };
  let config = load_config(&config_dir);
  init_cli_logging(&config.logging.level, cli.verbose);

  match cli.command {
    Commands::Refresh {
      catalog,
      remove,
      keep_missing,
      no_add,
      no_checksums,
      no_stats,
      stamp,
      json,
    } => {
      let mut options = reconcile::ReconcileOptions::from(&config.refresh);
      if remove {
        options.remove_missing = true;
      }
      if keep_missing {
        options.remove_missing = false;
      }
      options.add_unreferenced &= !no_add;
      options.compute_checksums &= !no_checksums;
      options.populate_stats &= !no_stats;
      cmd_refresh(config, &catalog, options, &stamp, json)
    }
    Commands::Formalize {
      catalog,
      checksums,
      remove,
      stamp,
    } => cmd_formalize(config, &catalog, checksums, remove, &stamp),
    Commands::Audit { catalog, json } => cmd_audit(config, &catalog, json),
    Commands::Replace {
      catalog,
      uri,
      source,
      stamp,
    } => cmd_replace(config, &catalog, &uri, &source, &stamp),
    Commands::Remove { catalog, uri, stamp } => cmd_remove(config, &catalog, &uri, &stamp),
    Commands::Config { command } => match command {
      ConfigCommand::Show { .. } => cmd_config_show(&config_dir, &config),
      ConfigCommand::Init { .. } => cmd_config_init(&config_dir),
    },
  }
}
