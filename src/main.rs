//! Media catalog CLI
//!
//! Synchronizes directory trees of media files into a SQLite catalog.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use media_catalog::{LoftyExtractor, ScanConfig, ScanEngine, SqliteStore};

/// Media catalog synchronizer
#[derive(Parser)]
#[command(name = "media_catalog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan directory trees into the catalog
    Scan {
        /// Root directories to scan (repeatable)
        #[arg(short = 'r', long, required = true)]
        roots: Vec<PathBuf>,

        /// Catalog database file path
        #[arg(short = 'd', long, default_value = "media_catalog.db")]
        db: PathBuf,

        /// Volume identifier ("internal" disables playlist and genre
        /// processing)
        #[arg(short = 'v', long, default_value = "external")]
        volume: String,

        /// Maximum traversal depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Thumbnail directory to reconcile after the scan
        #[arg(long)]
        thumbnail_dir: Option<PathBuf>,

        /// Print the scan summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scan a single file
    File {
        /// Path of the file to scan
        path: PathBuf,

        /// Catalog database file path
        #[arg(short = 'd', long, default_value = "media_catalog.db")]
        db: PathBuf,

        /// Declared MIME type hint
        #[arg(short = 'm', long)]
        mime: Option<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Commands::Scan {
            roots,
            db,
            volume,
            max_depth,
            thumbnail_dir,
            json,
        } => {
            let mut config = ScanConfig::for_volume(volume);
            config.max_depth = max_depth;
            if let Some(dir) = thumbnail_dir {
                config.thumbnail_dir = dir;
            }

            let mut engine = match build_engine(&db, config) {
                Ok(engine) => engine,
                Err(e) => {
                    error!("cannot open catalog {}: {}", db.display(), e);
                    return ExitCode::FAILURE;
                }
            };

            info!("scanning {} root(s) into {}", roots.len(), db.display());
            match engine.scan_tree(&roots) {
                Ok(summary) => {
                    if json {
                        match serde_json::to_string_pretty(&summary) {
                            Ok(out) => println!("{}", out),
                            Err(e) => {
                                error!("summary serialization failed: {}", e);
                                return ExitCode::FAILURE;
                            }
                        }
                    } else {
                        println!("Scan completed:");
                        println!("  Files seen:         {}", summary.files_seen);
                        println!("  Inserted:           {}", summary.inserted);
                        println!("  Updated:            {}", summary.updated);
                        println!("  Unchanged:          {}", summary.skipped);
                        println!("  Deleted:            {}", summary.deleted);
                        println!("  Playlists resolved: {}", summary.playlists_resolved);
                        println!("  Thumbnails pruned:  {}", summary.thumbnails_pruned);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("scan failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::File { path, db, mime } => {
            let mut engine = match build_engine(&db, ScanConfig::default()) {
                Ok(engine) => engine,
                Err(e) => {
                    error!("cannot open catalog {}: {}", db.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            match engine.scan_one(&path, mime.as_deref()) {
                Ok(Some(id)) => {
                    println!("{}", id);
                    ExitCode::SUCCESS
                }
                Ok(None) => {
                    info!("{} produced no catalog row", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("scan failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn build_engine(db: &Path, config: ScanConfig) -> media_catalog::Result<ScanEngine> {
    let store = SqliteStore::open(db)?;
    let settings = store.settings();
    Ok(ScanEngine::new(
        Box::new(store),
        Box::new(settings),
        Box::new(LoftyExtractor),
        config,
    ))
}
