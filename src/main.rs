//! Binary entry point for ecotag-cache.
//!
//! Command-line access to the image cache: look up, store, inspect and prune
//! entries in a `SQLite` cache file. Every command prints JSON on stdout.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use ecotag_cache::embedding::{FINGERPRINT_DIMENSIONS, PerceptualFingerprinter};
use ecotag_cache::observability;
use ecotag_cache::{
    CacheConfig, CacheMode, CacheService, ContentHasher, Error, Result, SqliteCacheStore,
    StoreRequest,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// ecotag-cache - tiered perceptual cache for garment-tag image analyses.
#[derive(Parser)]
#[command(name = "ecotag-cache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache database path (overrides configuration).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Lookup mode: exact, semantic, or tiered (overrides configuration).
    #[arg(long, global = true)]
    mode: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Look up a cached analysis for an image.
    Lookup {
        /// Image file (PNG or JPEG).
        image: PathBuf,
    },

    /// Store an analysis for an image.
    Store {
        /// Image file (PNG or JPEG).
        image: PathBuf,

        /// Analysis payload as inline JSON, or `@FILE` to read it from a file.
        #[arg(short, long)]
        payload: String,
    },

    /// Show entry count and active settings.
    Stats,

    /// Evict the oldest entries until at most `max` remain.
    Prune {
        /// Number of entries to keep.
        #[arg(short, long)]
        max: usize,
    },

    /// Delete every entry.
    Clear,

    /// Print the content hash and perceptual fingerprint of an image.
    Fingerprint {
        /// Image file (PNG or JPEG).
        image: PathBuf,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = observability::init_from_env(cli.verbose) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Resolves configuration: file (explicit or default), env, then CLI flags.
fn load_config(cli: &Cli) -> Result<CacheConfig> {
    let mut config = match &cli.config {
        Some(path) => CacheConfig::load_from_file(path)?,
        None => CacheConfig::load_default(),
    };

    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    if let Some(mode) = &cli.mode {
        config.mode = CacheMode::parse(mode).ok_or_else(|| {
            Error::InvalidInput(format!(
                "unknown mode '{mode}' (expected exact, semantic, or tiered)"
            ))
        })?;
    }
    Ok(config)
}

/// Runs the selected command.
fn run_command(command: Commands, config: CacheConfig) -> Result<()> {
    let open = || -> Result<CacheService> {
        let store = Arc::new(SqliteCacheStore::new(&config.db_path)?);
        Ok(CacheService::new(config.clone(), store))
    };

    match command {
        Commands::Lookup { image } => print_json(&open()?.lookup(&read_file(&image)?)?),
        Commands::Store { image, payload } => {
            let bytes = read_file(&image)?;
            let payload = parse_payload(&payload)?;
            print_json(&open()?.store(StoreRequest::new(&bytes, payload))?)
        },
        Commands::Stats => print_json(&open()?.stats()?),
        Commands::Prune { max } => {
            let cache = open()?;
            let evicted = cache.prune_to(max)?;
            print_json(&json!({ "evicted": evicted, "remaining": cache.count()? }))
        },
        Commands::Clear => {
            open()?.reset()?;
            print_json(&json!({ "cleared": true }))
        },
        Commands::Fingerprint { image } => cmd_fingerprint(&image),
    }
}

/// Prints the hash and fingerprint of an image without opening the cache.
fn cmd_fingerprint(image: &Path) -> Result<()> {
    let bytes = read_file(image)?;
    let vector = PerceptualFingerprinter::new().fingerprint(&bytes)?;
    print_json(&json!({
        "image_hash": ContentHasher::hash(&bytes),
        "dimensions": FINGERPRINT_DIMENSIONS,
        "vector": vector,
    }))
}

/// Parses an inline JSON payload or reads it from `@FILE`.
fn parse_payload(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => String::from_utf8(read_file(Path::new(path))?)
            .map_err(|e| Error::InvalidInput(format!("payload file is not UTF-8: {e}")))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| Error::InvalidInput(format!("invalid payload JSON: {e}")))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::OperationFailed {
        operation: "read_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_output".to_string(),
        cause: e.to_string(),
    })?;
    println!("{rendered}");
    Ok(())
}
