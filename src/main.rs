//! # Web Media Budget - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap` (sottocomandi)
//! - Inizializzazione del sistema di logging con `tracing` (`RUST_LOG` ha la precedenza)
//! - Merge della configurazione: default → file JSON → flag CLI
//! - Avvio del batch richiesto
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica e valida la configurazione
//! 4. Crea la directory di input se manca (il batch risulterà vuoto)
//! 5. Istanzia MediaOptimizer o SemanticGate e avvia il processo
//!
//! Exit code 0 quando il batch è stato eseguito, anche con item falliti.
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-budget images ./public/images --target-size-mb 3 --workers 8
//! media-budget videos ./public/videos --manifest videos.json --json
//! media-budget classify ./src/images --scorer ./clip-score.py
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use web_media_budget::{
    config::mb_to_bytes,
    file_manager::FileManager,
    json_output::JsonMessage,
    semantic_gate::{CommandScorer, Hypotheses, SemanticGate, DEFAULT_TARGET_SUBDIR},
    Config, MediaOptimizer,
};

#[derive(Parser)]
#[command(name = "media-budget", version)]
#[command(about = "Fit images and video clips under hard size budgets for web delivery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file (CLI flags override its values)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of parallel workers (default: logical cores)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Output progress as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encode large images as WebP under the target size
    Images {
        /// Directory containing the images
        input: PathBuf,

        /// Output directory [default: <INPUT>/img_optimized]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Images below this size (MB) are left alone
        #[arg(long)]
        min_size_mb: Option<f64>,

        /// Size (MB) each output should stay under
        #[arg(long)]
        target_size_mb: Option<f64>,
    },

    /// Transcode clips to H.264 at a bitrate derived from their duration
    Videos {
        /// Directory containing the clips
        input: PathBuf,

        /// Output directory [default: <INPUT>/temp_h264]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON map of input name to output name (null keeps the name)
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Size (MB) each clip should stay under
        #[arg(long)]
        target_size_mb: Option<f64>,

        /// ffmpeg video codec
        #[arg(long)]
        codec: Option<String>,

        /// Encoder preset
        #[arg(long)]
        preset: Option<String>,

        /// Do not move container metadata to the front
        #[arg(long)]
        no_faststart: bool,
    },

    /// Move images matching the positive description into a subdirectory
    Classify {
        /// Directory containing the images
        dir: PathBuf,

        /// Scoring program, called once per image
        #[arg(long)]
        scorer: PathBuf,

        /// Extra argument passed to the scorer before the image (repeatable)
        #[arg(long = "scorer-arg", allow_hyphen_values = true)]
        scorer_args: Vec<String>,

        /// Description of the images to move
        #[arg(long)]
        positive: Option<String>,

        /// Description of the images to keep
        #[arg(long)]
        negative: Option<String>,

        /// Subdirectory receiving the matching images
        #[arg(long, default_value = DEFAULT_TARGET_SUBDIR)]
        target_subdir: String,
    },

    /// Write a configuration file with the default values
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    if let Err(e) = run(cli).await {
        if json {
            JsonMessage::error(format!("{:#}", e)).emit();
        }
        return Err(e);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref()).await?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.json_output = cli.json;

    match cli.command {
        Commands::Images {
            input,
            output,
            min_size_mb,
            target_size_mb,
        } => {
            if let Some(mb) = min_size_mb {
                config.min_image_size_bytes = mb_to_bytes(mb);
            }
            if let Some(mb) = target_size_mb {
                config.target_image_size_bytes = mb_to_bytes(mb);
            }
            config.validate()?;

            bootstrap_input(&input)?;
            let output = output.unwrap_or_else(|| input.join("img_optimized"));

            let optimizer = MediaOptimizer::new(config)?;
            optimizer.optimize_images(&input, &output).await?;
        }

        Commands::Videos {
            input,
            output,
            manifest,
            target_size_mb,
            codec,
            preset,
            no_faststart,
        } => {
            if let Some(mb) = target_size_mb {
                config.target_video_size_bytes = mb_to_bytes(mb);
            }
            if let Some(codec) = codec {
                config.video_codec = codec;
            }
            if let Some(preset) = preset {
                config.video_preset = preset;
            }
            if no_faststart {
                config.faststart = false;
            }
            config.validate()?;

            bootstrap_input(&input)?;
            let output = output.unwrap_or_else(|| input.join("temp_h264"));

            let optimizer = MediaOptimizer::new(config)?;
            optimizer
                .transcode_videos(&input, &output, manifest.as_deref())
                .await?;
        }

        Commands::Classify {
            dir,
            scorer,
            scorer_args,
            positive,
            negative,
            target_subdir,
        } => {
            let defaults = Hypotheses::default();
            let hypotheses = Hypotheses {
                positive: positive.unwrap_or(defaults.positive),
                negative: negative.unwrap_or(defaults.negative),
            };

            bootstrap_input(&dir)?;
            let gate = SemanticGate::new(Arc::new(CommandScorer::new(scorer, scorer_args)), hypotheses);
            let summary =
                tokio::task::spawn_blocking(move || gate.run(&dir, &target_subdir)).await??;

            if config.json_output {
                JsonMessage::gate_complete(&summary).emit();
            } else {
                info!(
                    "Classification complete: {} moved, {} kept, {} errors",
                    summary.moved, summary.kept, summary.errors
                );
            }
        }

        Commands::InitConfig { path } => {
            config.save_to_file(&path).await?;
            info!("Configuration written to {}", path.display());
        }
    }

    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let config = Config::from_file(path).await?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// A missing input directory is created; the batch then finds nothing to do.
fn bootstrap_input(dir: &Path) -> Result<()> {
    if !dir.exists() {
        info!("Input directory {} does not exist, creating it", dir.display());
    }
    FileManager::ensure_dir(dir)?;
    Ok(())
}
