//! Tilecache CLI - inspect and seed an on-disk tile cache
//!
//! Settings come from the config file (`--config`, or the default location)
//! and can be overridden per invocation.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tilecache::cache::{DiskTileCache, TileKey};
use tilecache::config::{parse_size, ConfigFile};
use tilecache::logging::init_logging;
use tracing::debug;

use error::CliError;

#[derive(Parser)]
#[command(name = "tilecache")]
#[command(version = tilecache::VERSION)]
#[command(about = "Size-bounded on-disk LRU cache for map tiles", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/tilecache/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Storage budget, e.g. 512MB or 2GB
    #[arg(long, global = true, value_parser = parse_size)]
    max_size: Option<u64>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache size, budget and entry count
    Stats,

    /// Write a cached tile to a file or stdout (exits 1 on a miss)
    Get {
        /// Tile key as x.y.zoom
        key: TileKey,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Store a file's bytes as a tile
    Put {
        /// Tile key as x.y.zoom
        key: TileKey,

        /// File holding the tile bytes
        file: PathBuf,
    },
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    if let Some(root) = cli.root {
        config.cache.directory = root;
    }
    if let Some(max_size) = cli.max_size {
        config.cache.max_size = max_size;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let _logging_guard = init_logging(&config.logging.level, config.logging.file.as_deref())
        .map_err(CliError::LoggingInit)?;
    debug!(?config, "Configuration resolved");

    let cache = DiskTileCache::open(config.cache_config())?;

    match cli.command {
        Commands::Stats => commands::stats::run(&cache),
        Commands::Get { key, output } => commands::tile::get(&cache, &key, output.as_deref()),
        Commands::Put { key, file } => commands::tile::put(&cache, &key, &file),
    }
}
