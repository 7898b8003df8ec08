//! # Media Optimizer Main Orchestrator
//!
//! Orchestratore del batch: discovery, dispatch sul worker pool, raccolta esiti.
//!
//! ## Flusso:
//! 1. Discovery degli item (immagini al primo livello, oppure manifest video)
//! 2. Verifica dei tool esterni richiesti dagli item (fatale se mancano)
//! 3. Creazione directory di output (fatale se impossibile)
//! 4. Batch vuoto: messaggio e uscita pulita
//! 5. Dispatch sul `WorkerPool`, esiti stampati in ordine di completamento
//! 6. Statistiche finali
//!
//! Gli errori di un item restano nel suo `OutcomeRecord`: solo gli errori di
//! setup (punti 2 e 3) interrompono il batch.

use crate::{
    artifact::{MediaArtifact, MediaKind, Operation, OutcomeRecord, WorkItem},
    config::Config,
    error::OptimizeError,
    file_manager::FileManager,
    image_processor::{CwebpEncoder, ImageEncoder, ImageSizeReducer},
    json_output::JsonMessage,
    optimizer::{manifest::VideoManifest, worker_pool::WorkerPool},
    platform::PlatformCommands,
    progress::{BatchTotals, ProgressReporter},
    size_probe::SizeProbe,
    video_processor::{FfmpegEncoder, FfprobeProbe, MediaProbe, VideoBitrateTranscoder, VideoEncoder},
};
use anyhow::Result;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one batch produced
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// In completion order
    pub outcomes: Vec<OutcomeRecord>,
    pub totals: BatchTotals,
    pub duration_seconds: f64,
}

/// Orchestratore principale
pub struct MediaOptimizer {
    config: Arc<Config>,
    pool: WorkerPool,
    reducer: Arc<ImageSizeReducer>,
    transcoder: Arc<VideoBitrateTranscoder>,
    check_tools: bool,
}

impl MediaOptimizer {
    /// Optimizer backed by cwebp, ffprobe and ffmpeg
    pub fn new(config: Config) -> Result<Self> {
        let mut optimizer = Self::with_tools(
            config,
            Arc::new(CwebpEncoder::default()),
            Arc::new(FfprobeProbe),
            Arc::new(FfmpegEncoder),
        )?;
        optimizer.check_tools = true;
        Ok(optimizer)
    }

    /// Optimizer with injected encoders; skips the external tool check
    pub fn with_tools(
        config: Config,
        image_encoder: Arc<dyn ImageEncoder>,
        video_probe: Arc<dyn MediaProbe>,
        video_encoder: Arc<dyn VideoEncoder>,
    ) -> Result<Self> {
        config.validate()?;

        let reducer = ImageSizeReducer::new(&config, image_encoder)?;
        let transcoder = VideoBitrateTranscoder::new(&config, video_probe, video_encoder)?;

        Ok(Self {
            pool: WorkerPool::new(config.workers),
            config: Arc::new(config),
            reducer: Arc::new(reducer),
            transcoder: Arc::new(transcoder),
            check_tools: false,
        })
    }

    /// Reduces every top-level image of `input_dir` into `output_dir` as WebP
    pub async fn optimize_images(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
        let items = FileManager::find_images(input_dir)?
            .into_iter()
            .map(|path| {
                let source = MediaArtifact::from_path(path)?;
                let output = self.reducer.output_path_for(&source, output_dir);
                Ok(WorkItem::reduce_image(source, output))
            })
            .collect::<Result<Vec<_>, OptimizeError>>()?;

        for output in Self::shared_outputs(&items) {
            warn!(
                "Several images write to {}; the last one to finish wins",
                output.display()
            );
        }

        if let Some(floor) = self.reducer.budget().eligibility() {
            info!(
                "Image budget: skip below {:.2}MB, target {:.2}MB",
                SizeProbe::to_mb(floor),
                SizeProbe::to_mb(self.reducer.budget().target())
            );
        }

        self.run_batch("images", input_dir, output_dir, items, Vec::new())
            .await
    }

    /// Transcodes the manifest entries (or every top-level video) of `input_dir`
    pub async fn transcode_videos(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        manifest: Option<&Path>,
    ) -> Result<BatchSummary> {
        let manifest = match manifest {
            Some(path) => VideoManifest::from_file(path, input_dir, output_dir).await?,
            None => VideoManifest::discover(input_dir, output_dir)?,
        };

        let mut items = Vec::new();
        let mut rejected = Vec::new();
        for entry in manifest {
            if !entry.source.is_file() {
                rejected.push(OutcomeRecord::failed(&entry.source, "source not found"));
                continue;
            }
            match MediaArtifact::from_path(entry.source.clone()) {
                Ok(source) if source.kind() == MediaKind::Video => {
                    items.push(WorkItem::transcode_video(source, entry.destination))
                }
                Ok(_) => rejected.push(OutcomeRecord::failed(&entry.source, "not a video file")),
                Err(e) => rejected.push(OutcomeRecord::failed(&entry.source, e)),
            }
        }

        info!(
            "Video budget: {:.2}MB per clip",
            SizeProbe::to_mb(self.transcoder.budget().target())
        );

        self.run_batch("videos", input_dir, output_dir, items, rejected)
            .await
    }

    /// Dispatches `items` on the pool. `rejected` are outcomes decided before dispatch.
    pub async fn run_batch(
        &self,
        operation: &str,
        input_dir: &Path,
        output_dir: &Path,
        items: Vec<WorkItem>,
        rejected: Vec<OutcomeRecord>,
    ) -> Result<BatchSummary> {
        let start_time = std::time::Instant::now();
        let total = items.len() + rejected.len();

        self.check_dependencies(&items).await?;
        FileManager::ensure_dir(output_dir)?;

        if self.config.json_output {
            JsonMessage::start(
                operation,
                input_dir.to_path_buf(),
                output_dir.to_path_buf(),
                total,
                self.pool.concurrency(),
            )
            .emit();
        } else {
            info!("Starting {} batch in: {}", operation, input_dir.display());
            info!("Output directory: {}", output_dir.display());
            info!("Found {} files to process with {} workers", total, self.pool.concurrency());
        }

        if total == 0 {
            return Ok(self.finish_empty(start_time));
        }

        let mut reporter = ProgressReporter::new(total, self.config.json_output);
        let mut outcomes = Vec::with_capacity(total);

        for outcome in rejected {
            reporter.report(&outcome);
            outcomes.push(outcome);
        }

        let sources: Vec<PathBuf> = items.iter().map(|item| item.source.path().to_path_buf()).collect();
        let reducer = Arc::clone(&self.reducer);
        let transcoder = Arc::clone(&self.transcoder);

        let stream = self.pool.map_unordered(items, move |item: WorkItem| match item.operation {
            Operation::ReduceImage { output } => reducer.reduce(&item.source, &output),
            Operation::TranscodeVideo { output } => transcoder.transcode(&item.source, &output),
        });
        tokio::pin!(stream);

        while let Some((index, result)) = stream.next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(panicked) => OutcomeRecord::failed(&sources[index], panicked),
            };
            reporter.report(&outcome);
            outcomes.push(outcome);
        }

        let totals = reporter.finish();
        let duration_seconds = start_time.elapsed().as_secs_f64();
        self.print_final_stats(&totals, duration_seconds);

        Ok(BatchSummary {
            outcomes,
            totals,
            duration_seconds,
        })
    }

    /// Tools needed by at least one item; an empty batch needs none
    fn required_tools(items: &[WorkItem]) -> Vec<&'static str> {
        let mut tools = Vec::new();
        if items.iter().any(|i| matches!(i.operation, Operation::ReduceImage { .. })) {
            tools.push("cwebp");
        }
        if items.iter().any(|i| matches!(i.operation, Operation::TranscodeVideo { .. })) {
            tools.extend(["ffprobe", "ffmpeg"]);
        }
        tools
    }

    /// Outputs claimed by more than one item (`a.png` and `a.jpg` both map to `a.webp`)
    fn shared_outputs(items: &[WorkItem]) -> Vec<&Path> {
        let mut counts: HashMap<&Path, usize> = HashMap::new();
        for item in items {
            let output = match &item.operation {
                Operation::ReduceImage { output } | Operation::TranscodeVideo { output } => output,
            };
            *counts.entry(output.as_path()).or_default() += 1;
        }

        let mut shared: Vec<&Path> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(path, _)| path)
            .collect();
        shared.sort();
        shared
    }

    /// Controlla dipendenze
    async fn check_dependencies(&self, items: &[WorkItem]) -> Result<(), OptimizeError> {
        if !self.check_tools {
            return Ok(());
        }

        let platform = PlatformCommands::instance();
        for tool in Self::required_tools(items) {
            if !platform.is_command_available(tool).await {
                return Err(OptimizeError::MissingDependency(format!(
                    "{} not found on PATH or in TOOLS_DIR",
                    platform.get_command(tool)
                )));
            }
            debug!("Found {}", platform.resolve(tool).display());
        }
        Ok(())
    }

    /// Gestisce directory vuota
    fn finish_empty(&self, start_time: std::time::Instant) -> BatchSummary {
        let duration_seconds = start_time.elapsed().as_secs_f64();
        if self.config.json_output {
            JsonMessage::complete(&BatchTotals::default(), duration_seconds).emit();
        } else {
            info!("No media files found to process");
        }
        BatchSummary {
            duration_seconds,
            ..Default::default()
        }
    }

    /// Stampa statistiche finali
    fn print_final_stats(&self, totals: &BatchTotals, duration: f64) {
        if self.config.json_output {
            JsonMessage::complete(totals, duration).emit();
        } else {
            info!("=== Optimization Complete ===");
            info!("Files processed: {}", totals.processed);
            info!("Files optimized: {}", totals.optimized);
            info!("Files over budget: {}", totals.over_budget);
            info!("Files skipped: {}", totals.skipped);
            info!("Errors: {}", totals.failed);
            info!("Bytes saved: {}", FileManager::format_size(totals.bytes_saved()));
            info!("Average reduction: {:.2}%", totals.saved_percent());
            info!("Elapsed: {:.1}s", duration);
        }
    }
}
