//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con soglie, parametri di ricerca e parametri encoder
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Deriva i `SizeBudget` usati da ImageSizeReducer e VideoBitrateTranscoder
//!
//! La configurazione è immutabile una volta avviato il batch: ogni componente
//! la riceve alla costruzione, nessuno stato globale.
//!
//! ## Parametri principali:
//! - `min_image_size_bytes`: sotto questa soglia un'immagine non viene toccata (5 MiB)
//! - `target_image_size_bytes`: peso massimo desiderato per l'output (4 MiB)
//! - `initial_quality` / `quality_floor` / `quality_step`: ricerca qualità 90 → 30, passo 10
//! - `shrink_factor`: riduzione per lato ad ogni passata (0.8)
//! - `target_video_size_bytes`: budget per clip (5 MiB)
//! - `bitrate_safety_margin`: margine per overhead container (0.9)
//! - `workers`: default = core logici dell'host
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::OptimizeError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Converts a megabyte figure (MiB, as used on the command line) to bytes.
pub fn mb_to_bytes(mb: f64) -> u64 {
    (mb * BYTES_PER_MB as f64).round() as u64
}

/// Logical core count of the host, falling back to a single worker.
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Eligibility floor and output target for one kind of artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBudget {
    eligibility: Option<u64>,
    target: u64,
}

impl SizeBudget {
    /// Budget with a "don't bother below" floor. The target may not exceed the floor.
    pub fn with_floor(eligibility: u64, target: u64) -> Result<Self, OptimizeError> {
        if target == 0 {
            return Err(OptimizeError::Validation("Target size must be greater than 0".into()));
        }
        if target > eligibility {
            return Err(OptimizeError::Validation(format!(
                "Target size ({} bytes) must not exceed the eligibility threshold ({} bytes)",
                target, eligibility
            )));
        }
        Ok(Self {
            eligibility: Some(eligibility),
            target,
        })
    }

    /// Budget where every input is processed.
    pub fn target_only(target: u64) -> Result<Self, OptimizeError> {
        if target == 0 {
            return Err(OptimizeError::Validation("Target size must be greater than 0".into()));
        }
        Ok(Self {
            eligibility: None,
            target,
        })
    }

    pub fn eligibility(&self) -> Option<u64> {
        self.eligibility
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Strict `<` for skipping: a file exactly at the floor is eligible.
    pub fn is_eligible(&self, size: u64) -> bool {
        self.eligibility.map_or(true, |floor| size >= floor)
    }

    pub fn exceeds_target(&self, size: u64) -> bool {
        size > self.target
    }
}

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Images smaller than this are reported as skipped
    pub min_image_size_bytes: u64,
    /// Size the image search tries to get under
    pub target_image_size_bytes: u64,
    /// First encode quality (1-100)
    pub initial_quality: u8,
    /// No encode ever runs below this quality
    pub quality_floor: u8,
    /// Quality decrement per shrink pass
    pub quality_step: u8,
    /// Per-side scale applied on each shrink pass
    pub shrink_factor: f64,
    /// Size budget for every transcoded clip
    pub target_video_size_bytes: u64,
    /// Fraction of the naive size/duration bitrate actually requested
    pub bitrate_safety_margin: f64,
    /// Clips wider than this are downscaled to it
    pub max_video_width: u32,
    /// ffmpeg video codec selector
    pub video_codec: String,
    /// Codec profile
    pub video_profile: String,
    /// Encoder effort preset
    pub video_preset: String,
    /// Relocate container metadata for fast streaming start
    pub faststart: bool,
    /// Number of parallel workers
    pub workers: usize,
    /// Output progress and outcomes as JSON lines
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_image_size_bytes: 5 * BYTES_PER_MB,
            target_image_size_bytes: 4 * BYTES_PER_MB,
            initial_quality: 90,
            quality_floor: 30,
            quality_step: 10,
            shrink_factor: 0.8,
            target_video_size_bytes: 5 * BYTES_PER_MB,
            bitrate_safety_margin: 0.9,
            max_video_width: 1920,
            video_codec: "h264_nvenc".to_string(),
            video_profile: "high".to_string(),
            video_preset: "p7".to_string(),
            faststart: true,
            workers: host_parallelism(),
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.image_budget()?;
        self.video_budget()?;

        if self.initial_quality == 0 || self.initial_quality > 100 {
            return Err(anyhow::anyhow!("Initial quality must be between 1 and 100"));
        }

        if self.quality_floor == 0 || self.quality_floor >= self.initial_quality {
            return Err(anyhow::anyhow!(
                "Quality floor must be between 1 and the initial quality ({})",
                self.initial_quality
            ));
        }

        if self.quality_step == 0 {
            return Err(anyhow::anyhow!("Quality step must be greater than 0"));
        }

        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(anyhow::anyhow!("Shrink factor must be between 0.0 and 1.0 (exclusive)"));
        }

        if !(self.bitrate_safety_margin > 0.0 && self.bitrate_safety_margin <= 1.0) {
            return Err(anyhow::anyhow!("Bitrate safety margin must be in (0.0, 1.0]"));
        }

        if self.max_video_width == 0 {
            return Err(anyhow::anyhow!("Max video width must be greater than 0"));
        }

        if self.video_codec.trim().is_empty() || self.video_preset.trim().is_empty() {
            return Err(anyhow::anyhow!("Video codec and preset must not be empty"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        Ok(())
    }

    pub fn image_budget(&self) -> Result<SizeBudget, OptimizeError> {
        SizeBudget::with_floor(self.min_image_size_bytes, self.target_image_size_bytes)
    }

    pub fn video_budget(&self) -> Result<SizeBudget, OptimizeError> {
        SizeBudget::target_only(self.target_video_size_bytes)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
