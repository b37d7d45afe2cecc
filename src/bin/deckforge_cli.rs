//! DeckForge CLI - Sheet generation and URL remapping
//!
//! Commands: generate, prepare, replace
//! Outputs JSON to stdout, logs to stderr
//! Returns 1 on bad input, 2 when the operation itself fails

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;

use deckforge_core::{
    remap, Config, GenerateRequest, Generator, JobStatus, ManifestCatalog, Mapping, ProgressTracker, PushChannel,
    SettingsFile, SortOrder,
};

#[derive(Parser)]
#[command(name = "deckforge-cli")]
#[command(about = "DeckForge CLI - Card sheets and scene documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runtime configuration (JSON)
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// User settings (JSON), re-read on every run
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Catalog manifest
    #[arg(long, default_value = "catalog.json")]
    catalog: PathBuf,

    /// Overrides the configured results directory
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Draw sheets and write the scene document for a game
    Generate {
        /// Game ID
        #[arg(short, long)]
        game: String,

        /// name, name_desc, created or created_desc
        #[arg(long, default_value = "name")]
        sort: SortOrder,

        /// Integer divisor applied to card size
        #[arg(long, default_value_t = 1)]
        scale: u32,
    },

    /// List URLs that need a mapping, as a mapping template
    Prepare {
        /// Scene document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Rewrite every URL through a mapping
    Replace {
        /// Scene document
        #[arg(short, long)]
        file: PathBuf,

        /// Mapping file
        #[arg(short, long)]
        mapping: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn fail(code: u8, error: impl std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": error.to_string(),
    });
    println!("{}", output);
    ExitCode::from(code)
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => fail(2, e),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Generate { game, sort, scale } => {
            let mut config = match Config::load(&cli.config) {
                Ok(c) => c,
                Err(e) => return fail(1, e),
            };
            if let Some(dir) = cli.results_dir {
                config.results_dir = dir;
            }

            let catalog = match ManifestCatalog::load(&cli.catalog) {
                Ok(c) => c,
                Err(e) => return fail(1, e),
            };

            let generator = Generator::new(
                Arc::new(catalog),
                Arc::new(SettingsFile::new(cli.settings)),
                &config,
                Arc::new(ProgressTracker::new()),
                Arc::new(PushChannel::new(config.push_address.clone(), config.data_url.clone())),
            );

            let request = GenerateRequest { sort_order: sort, scale };
            let handle = match generator.generate(&game, request) {
                Ok(h) => h,
                Err(e) => return fail(1, e),
            };
            if handle.join().is_err() {
                return fail(2, "Generator thread panicked");
            }

            let status = generator.tracker().status();
            let failed = status.status == JobStatus::Error;
            let code = print_json(&status);
            if failed {
                ExitCode::from(2)
            } else {
                code
            }
        }

        Commands::Prepare { file } => {
            let data = match fs::read(&file) {
                Ok(d) => d,
                Err(e) => return fail(1, format!("Failed to read {}: {}", file.display(), e)),
            };
            match remap::prepare(&data) {
                Ok(urls) => print_json(&Mapping::from_urls(urls)),
                Err(e) => fail(2, e),
            }
        }

        Commands::Replace { file, mapping, out } => {
            let data = match fs::read(&file) {
                Ok(d) => d,
                Err(e) => return fail(1, format!("Failed to read {}: {}", file.display(), e)),
            };
            let mapping_data = match fs::read(&mapping) {
                Ok(d) => d,
                Err(e) => return fail(1, format!("Failed to read {}: {}", mapping.display(), e)),
            };

            let root = match remap::replace(&data, &mapping_data) {
                Ok(r) => r,
                Err(e) => return fail(2, e),
            };

            let Some(out) = out else {
                return print_json(&root);
            };
            let written = serde_json::to_vec_pretty(&root)
                .map_err(|e| e.to_string())
                .and_then(|bytes| fs::write(&out, bytes).map_err(|e| e.to_string()));
            match written {
                Ok(()) => print_json(&serde_json::json!({ "success": true, "file": out.display().to_string() })),
                Err(e) => fail(2, e),
            }
        }
    }
}
