//! # Image Processing Module
//!
//! Questo modulo porta una singola immagine sotto il budget di peso tramite una
//! ricerca iterativa su qualità e risoluzione.
//!
//! ## Pipeline per immagine
//!
//! 1. **Eleggibilità**: se il file pesa meno della soglia (`<` stretto) l'esito è
//!    `Skipped`, nessun encode viene tentato
//! 2. **Decode + normalizzazione**: canale alpha e palette vengono appiattiti in RGB
//!    opaco. L'alpha viene scartato, è una scelta irreversibile e voluta
//! 3. **Primo encode**: qualità 90, dimensioni originali
//! 4. **Loop di riduzione**: finché l'output supera il target e la qualità è sopra
//!    il floor (30): lati × 0.8 (Lanczos), nuovo encode alla qualità corrente,
//!    nuova misura, qualità − 10. Traiettoria: 90, 90, 80, 70, 60, 50, 40.
//!    Nessun encode avviene al floor o sotto
//! 5. **Esito**: `Success` se sotto target, `Overshoot` se il floor è stato raggiunto
//!    prima del target. Mai un errore
//!
//! ## Divisione del lavoro
//!
//! | Fase                 | Dove                         |
//! |----------------------|------------------------------|
//! | Decode, alpha, resize| in-process con `image`       |
//! | Encode WebP lossy    | `cwebp` (tool esterno)       |
//! | Misura               | `SizeProbe` sul file scritto |
//!
//! Il re-encode da pixel perde EXIF e profili ICC come effetto collaterale.
//!
//! ## Esempio
//!
//! ```ignore
//! let reducer = ImageSizeReducer::new(&config, Arc::new(CwebpEncoder::default()))?;
//! let output = reducer.output_path_for(&artifact, &output_dir);
//! let outcome = reducer.reduce(&artifact, &output);
//! ```

use crate::artifact::{MediaArtifact, OutcomeRecord};
use crate::config::{Config, SizeBudget};
use crate::error::OptimizeError;
use crate::platform::PlatformCommands;
use crate::size_probe::SizeProbe;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Lossy encoder seam. Implementations overwrite `output` on every call.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, frame: &RgbImage, quality: u8, output: &Path) -> Result<(), OptimizeError>;

    /// Extension of the files this encoder produces
    fn extension(&self) -> &'static str {
        "webp"
    }
}

/// WebP encoding through `cwebp`, fed a temporary lossless PNG of the frame.
pub struct CwebpEncoder {
    /// cwebp `-m` compression method (0 = fast, 6 = slowest/best)
    method: u8,
}

impl Default for CwebpEncoder {
    fn default() -> Self {
        Self { method: 6 }
    }
}

impl ImageEncoder for CwebpEncoder {
    fn encode(&self, frame: &RgbImage, quality: u8, output: &Path) -> Result<(), OptimizeError> {
        let staging = tempfile::Builder::new()
            .prefix("media-budget-")
            .suffix(".png")
            .tempfile()?;
        frame.save_with_format(staging.path(), ImageFormat::Png)?;

        let cwebp = PlatformCommands::instance().resolve("cwebp");
        let result = Command::new(&cwebp)
            .args(crate::args![
                "-quiet",
                "-q",
                quality,
                "-m",
                self.method,
                "-metadata",
                "none"
            ])
            .arg(staging.path())
            .arg("-o")
            .arg(output)
            .output()
            .map_err(|e| {
                OptimizeError::Encoder(format!("Failed to execute {}: {}", cwebp.display(), e))
            })?;

        if !result.status.success() {
            return Err(OptimizeError::Encoder(
                String::from_utf8_lossy(&result.stderr).trim().to_string(),
            ));
        }

        // staging PNG is removed when `staging` drops
        Ok(())
    }
}

/// Parameters of the quality/resolution search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySearch {
    pub initial_quality: u8,
    pub quality_floor: u8,
    pub quality_step: u8,
    pub shrink_factor: f64,
}

impl Default for QualitySearch {
    fn default() -> Self {
        Self {
            initial_quality: 90,
            quality_floor: 30,
            quality_step: 10,
            shrink_factor: 0.8,
        }
    }
}

impl From<&Config> for QualitySearch {
    fn from(config: &Config) -> Self {
        Self {
            initial_quality: config.initial_quality,
            quality_floor: config.quality_floor,
            quality_step: config.quality_step,
            shrink_factor: config.shrink_factor,
        }
    }
}

/// One encode of the search trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionAttempt {
    pub quality: u8,
    /// Cumulative per-side scale relative to the decoded source
    pub scale: f64,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

/// Drives a single image under its target size
pub struct ImageSizeReducer {
    budget: SizeBudget,
    search: QualitySearch,
    encoder: Arc<dyn ImageEncoder>,
}

impl ImageSizeReducer {
    pub fn new(config: &Config, encoder: Arc<dyn ImageEncoder>) -> Result<Self, OptimizeError> {
        Ok(Self::with_budget(
            config.image_budget()?,
            QualitySearch::from(config),
            encoder,
        ))
    }

    pub fn with_budget(
        budget: SizeBudget,
        search: QualitySearch,
        encoder: Arc<dyn ImageEncoder>,
    ) -> Self {
        Self {
            budget,
            search,
            encoder,
        }
    }

    pub fn budget(&self) -> SizeBudget {
        self.budget
    }

    /// `<output_dir>/<stem>.webp`, whatever the source format
    pub fn output_path_for(&self, source: &MediaArtifact, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.{}", source.stem(), self.encoder.extension()))
    }

    /// Runs the whole pipeline for one image. Never panics on bad input and never
    /// returns an error: every failure becomes `OutcomeRecord::Failed`.
    pub fn reduce(&self, source: &MediaArtifact, output: &Path) -> OutcomeRecord {
        match self.try_reduce(source, output) {
            Ok(outcome) => outcome,
            Err(e) => OutcomeRecord::failed(source.path(), e),
        }
    }

    fn try_reduce(
        &self,
        source: &MediaArtifact,
        output: &Path,
    ) -> Result<OutcomeRecord, OptimizeError> {
        if !source.path().exists() {
            return Err(OptimizeError::SourceNotFound(source.path().display().to_string()));
        }

        let original_size = source.size()?;
        if !self.budget.is_eligible(original_size) {
            let floor = self.budget.eligibility().unwrap_or_default();
            return Ok(OutcomeRecord::skipped(
                source.path(),
                format!(
                    "{:.2}MB is below the {:.2}MB threshold",
                    SizeProbe::to_mb(original_size),
                    SizeProbe::to_mb(floor)
                ),
            ));
        }

        info!(
            "-> Processing '{}' ({:.2}MB) on {:?}",
            source.file_name(),
            SizeProbe::to_mb(original_size),
            std::thread::current().id()
        );

        let frame = Self::decode_flattened(source.path())?;
        let name = source.file_name();
        let last = self.search(frame, output, |attempt| {
            debug!(
                "{}: q={} scale={:.3} {}x{} -> {:.2}MB",
                name,
                attempt.quality,
                attempt.scale,
                attempt.width,
                attempt.height,
                SizeProbe::to_mb(attempt.size)
            );
        })?;

        Ok(OutcomeRecord::completed(
            source.path(),
            original_size,
            last.size,
            output,
            self.budget.target(),
        ))
    }

    /// Decodes by content (not extension) and drops alpha/palette into opaque RGB.
    pub fn decode_flattened(path: &Path) -> Result<RgbImage, OptimizeError> {
        let decoded = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?;

        if decoded.color().has_alpha() {
            debug!("Dropping alpha channel of {}", path.display());
        }

        Ok(decoded.into_rgb8())
    }

    /// Quality/resolution search. Returns the last attempt, which is the one left
    /// on disk at `output`. `on_attempt` sees every attempt in order.
    pub fn search<F>(
        &self,
        mut frame: RgbImage,
        output: &Path,
        mut on_attempt: F,
    ) -> Result<CompressionAttempt, OptimizeError>
    where
        F: FnMut(&CompressionAttempt),
    {
        let QualitySearch {
            initial_quality,
            quality_floor,
            quality_step,
            shrink_factor,
        } = self.search;

        let mut quality = initial_quality;
        let mut scale = 1.0;
        let mut attempt = self.encode_attempt(&frame, quality, scale, output)?;
        on_attempt(&attempt);

        while self.budget.exceeds_target(attempt.size) && quality > quality_floor {
            debug!(
                "[resize] {:.2}MB still above target, shrinking {}x{}",
                SizeProbe::to_mb(attempt.size),
                frame.width(),
                frame.height()
            );

            frame = Self::shrink(&frame, shrink_factor);
            scale *= shrink_factor;

            // Encode at the current quality, then lower it for the next pass
            attempt = self.encode_attempt(&frame, quality, scale, output)?;
            on_attempt(&attempt);
            quality = quality.saturating_sub(quality_step);
        }

        Ok(attempt)
    }

    fn encode_attempt(
        &self,
        frame: &RgbImage,
        quality: u8,
        scale: f64,
        output: &Path,
    ) -> Result<CompressionAttempt, OptimizeError> {
        self.encoder.encode(frame, quality, output)?;
        Ok(CompressionAttempt {
            quality,
            scale,
            width: frame.width(),
            height: frame.height(),
            size: SizeProbe::bytes(output)?,
        })
    }

    /// Proportional downscale, never below 1x1
    fn shrink(frame: &RgbImage, factor: f64) -> RgbImage {
        let width = ((frame.width() as f64 * factor) as u32).max(1);
        let height = ((frame.height() as f64 * factor) as u32).max(1);
        imageops::resize(frame, width, height, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes width * height * quality / 10 bytes, recording each call
    #[derive(Default)]
    struct FakeEncoder {
        calls: Mutex<Vec<(u32, u32, u8)>>,
    }

    impl FakeEncoder {
        fn calls(&self) -> Vec<(u32, u32, u8)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ImageEncoder for FakeEncoder {
        fn encode(&self, frame: &RgbImage, quality: u8, output: &Path) -> Result<(), OptimizeError> {
            let size = frame.width() as u64 * frame.height() as u64 * quality as u64 / 10;
            std::fs::write(output, vec![0u8; size as usize])?;
            self.calls
                .lock()
                .unwrap()
                .push((frame.width(), frame.height(), quality));
            Ok(())
        }
    }

    fn write_gradient(dir: &Path, name: &str, width: u32, height: u32) -> MediaArtifact {
        let path = dir.join(name);
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]))
            .save(&path)
            .unwrap();
        MediaArtifact::from_path(path).unwrap()
    }

    fn reducer(eligibility: u64, target: u64, encoder: Arc<FakeEncoder>) -> ImageSizeReducer {
        ImageSizeReducer::with_budget(
            SizeBudget::with_floor(eligibility, target).unwrap(),
            QualitySearch::default(),
            encoder,
        )
    }

    #[test]
    fn test_below_threshold_is_skipped_without_encoding() {
        let dir = TempDir::new().unwrap();
        let source = write_gradient(dir.path(), "small.png", 64, 48);
        let size = source.size().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let reducer = reducer(size + 1, size + 1, encoder.clone());
        let output = reducer.output_path_for(&source, dir.path());

        let outcome = reducer.reduce(&source, &output);

        assert_eq!(outcome.status(), "skipped");
        assert!(encoder.calls().is_empty());
        assert!(!output.exists());
    }

    #[test]
    fn test_exactly_at_threshold_is_processed() {
        let dir = TempDir::new().unwrap();
        let source = write_gradient(dir.path(), "edge.png", 64, 48);
        let size = source.size().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let reducer = reducer(size, size, encoder.clone());
        let output = reducer.output_path_for(&source, dir.path());

        let outcome = reducer.reduce(&source, &output);

        assert_ne!(outcome.status(), "skipped");
        assert!(!encoder.calls().is_empty());
        assert_eq!(output.file_name().unwrap(), "edge.webp");
    }

    #[test]
    fn test_first_encode_under_target_does_not_resize() {
        let dir = TempDir::new().unwrap();
        let source = write_gradient(dir.path(), "fits.jpg", 64, 48);
        let encoder = Arc::new(FakeEncoder::default());
        // 64 * 48 * 90 / 10 = 27648 bytes at the first attempt
        let reducer = reducer(30_000, 30_000, encoder.clone());
        let output = dir.path().join("fits.webp");

        let frame = ImageSizeReducer::decode_flattened(source.path()).unwrap();
        let last = reducer.search(frame, &output, |_| {}).unwrap();

        assert_eq!(encoder.calls(), vec![(64, 48, 90)]);
        assert_eq!(last.size, 27648);
        assert_eq!(last.scale, 1.0);
    }

    #[test]
    fn test_floor_is_respected_and_reported_as_overshoot() {
        let dir = TempDir::new().unwrap();
        let source = write_gradient(dir.path(), "huge.png", 64, 48);
        let encoder = Arc::new(FakeEncoder::default());
        let reducer = reducer(1, 1, encoder.clone());
        let output = reducer.output_path_for(&source, dir.path());

        let outcome = reducer.reduce(&source, &output);

        let qualities: Vec<u8> = encoder.calls().iter().map(|c| c.2).collect();
        assert_eq!(qualities, vec![90, 90, 80, 70, 60, 50, 40]);
        assert!(qualities.iter().all(|q| *q > 30));
        match outcome {
            OutcomeRecord::Overshoot { final_size, target, .. } => {
                assert_eq!(target, 1);
                assert_eq!(final_size, SizeProbe::bytes(&output).unwrap());
            }
            other => panic!("expected overshoot, got {:?}", other),
        }
    }

    #[test]
    fn test_trajectory_is_monotonic_and_proportional() {
        let dir = TempDir::new().unwrap();
        let source = write_gradient(dir.path(), "wide.png", 200, 100);
        let encoder = Arc::new(FakeEncoder::default());
        let reducer = reducer(1, 1, encoder.clone());
        let output = dir.path().join("wide.webp");

        let frame = ImageSizeReducer::decode_flattened(source.path()).unwrap();
        let mut attempts = Vec::new();
        reducer
            .search(frame, &output, |attempt| attempts.push(*attempt))
            .unwrap();

        assert_eq!(attempts.len(), 7);
        for pair in attempts.windows(2) {
            assert!(pair[1].size <= pair[0].size);
            assert!(pair[1].quality <= pair[0].quality);
            assert!(pair[1].scale < pair[0].scale);
        }
        // First shrink keeps the initial quality
        assert_eq!((attempts[1].width, attempts[1].height, attempts[1].quality), (160, 80, 90));
        let last = attempts[6];
        assert_eq!(last.quality, 40);
        assert!((last.scale - 0.8f64.powi(6)).abs() < 1e-9);
        for attempt in &attempts {
            let ratio = attempt.width as f64 / attempt.height as f64;
            assert!((ratio - 2.0).abs() < 0.1);
        }
    }

    #[test]
    fn test_stops_as_soon_as_target_is_met() {
        let dir = TempDir::new().unwrap();
        let source = write_gradient(dir.path(), "mid.png", 100, 100);
        let encoder = Arc::new(FakeEncoder::default());
        // q90 @100x100 = 90000, q90 @80x80 = 57600, q80 @64x64 = 32768
        let reducer = reducer(60_000, 60_000, encoder.clone());
        let output = dir.path().join("mid.webp");

        let frame = ImageSizeReducer::decode_flattened(source.path()).unwrap();
        let last = reducer.search(frame, &output, |_| {}).unwrap();

        assert_eq!(encoder.calls(), vec![(100, 100, 90), (80, 80, 90)]);
        assert_eq!(last.size, 57600);
    }

    #[test]
    fn test_alpha_is_flattened() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logo.png");
        RgbaImage::from_pixel(10, 10, Rgba([200, 10, 10, 0]))
            .save(&path)
            .unwrap();

        let frame = ImageSizeReducer::decode_flattened(&path).unwrap();
        assert_eq!(frame.dimensions(), (10, 10));
        assert_eq!(frame.get_pixel(0, 0), &Rgb([200, 10, 10]));
    }

    #[test]
    fn test_tiny_frames_never_reach_zero() {
        let dir = TempDir::new().unwrap();
        let source = write_gradient(dir.path(), "dot.png", 1, 1);
        let encoder = Arc::new(FakeEncoder::default());
        let reducer = reducer(1, 1, encoder.clone());
        let output = reducer.output_path_for(&source, dir.path());

        let outcome = reducer.reduce(&source, &output);

        assert!(!outcome.is_failure());
        assert!(encoder.calls().iter().all(|(w, h, _)| *w == 1 && *h == 1));
    }

    #[test]
    fn test_corrupt_and_missing_files_fail_per_item() {
        let dir = TempDir::new().unwrap();
        let corrupt = dir.path().join("broken.jpg");
        std::fs::write(&corrupt, b"definitely not a jpeg").unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let reducer = reducer(1, 1, encoder.clone());

        let source = MediaArtifact::from_path(corrupt.clone()).unwrap();
        let outcome = reducer.reduce(&source, &dir.path().join("broken.webp"));
        assert!(outcome.is_failure());

        let missing = MediaArtifact::from_path(dir.path().join("gone.png")).unwrap();
        let outcome = reducer.reduce(&missing, &dir.path().join("gone.webp"));
        assert!(matches!(outcome, OutcomeRecord::Failed { ref error, .. } if error.contains("not found")));
        assert!(encoder.calls().is_empty());
    }
}
