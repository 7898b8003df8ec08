//! # Artifacts, Work Items and Outcomes
//!
//! Tipi di dominio condivisi da reducer, transcoder e orchestratore.
//!
//! ## Tipi:
//! - `MediaArtifact`: riferimento immutabile ad un file sorgente (path + tipo)
//! - `WorkItem`: artifact + operazione, unità inviata al worker pool
//! - `OutcomeRecord`: esito tipizzato di un item (Success/Overshoot/Skipped/Failed)
//!
//! Gli input "path o stringa" vengono normalizzati qui, una volta sola, in
//! `MediaArtifact`. Nessun componente a valle lavora con stringhe.

use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::size_probe::SizeProbe;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Immutable reference to a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    path: PathBuf,
    kind: MediaKind,
}

impl MediaArtifact {
    /// Normalizes any path-like input, classifying it by extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, OptimizeError> {
        let path = path.into();
        if FileManager::extension_of(&path).is_none() {
            return Err(OptimizeError::Validation(format!(
                "File has no extension: {}",
                path.display()
            )));
        }

        let kind = if FileManager::is_image(&path) {
            MediaKind::Image
        } else if FileManager::is_video(&path) {
            MediaKind::Video
        } else {
            return Err(OptimizeError::Validation(format!(
                "Unsupported file format: {}",
                path.display()
            )));
        };

        Ok(Self { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    /// Probed on every call, never cached.
    pub fn size(&self) -> Result<u64, OptimizeError> {
        SizeProbe::bytes(&self.path)
    }
}

/// What a worker does with its artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ReduceImage { output: PathBuf },
    TranscodeVideo { output: PathBuf },
}

/// Unit dispatched to the worker pool. Carries everything its operation needs.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub source: MediaArtifact,
    pub operation: Operation,
}

impl WorkItem {
    pub fn reduce_image(source: MediaArtifact, output: PathBuf) -> Self {
        Self {
            source,
            operation: Operation::ReduceImage { output },
        }
    }

    pub fn transcode_video(source: MediaArtifact, output: PathBuf) -> Self {
        Self {
            source,
            operation: Operation::TranscodeVideo { output },
        }
    }
}

/// Terminal outcome of one work item
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeRecord {
    Success {
        source: PathBuf,
        original_size: u64,
        final_size: u64,
        output: PathBuf,
    },
    /// Produced, but still above the target after best-effort reduction
    Overshoot {
        source: PathBuf,
        original_size: u64,
        final_size: u64,
        output: PathBuf,
        target: u64,
    },
    Skipped {
        source: PathBuf,
        reason: String,
    },
    Failed {
        source: PathBuf,
        error: String,
    },
}

impl OutcomeRecord {
    pub fn skipped(source: &Path, reason: impl Into<String>) -> Self {
        Self::Skipped {
            source: source.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn failed(source: &Path, error: impl fmt::Display) -> Self {
        Self::Failed {
            source: source.to_path_buf(),
            error: error.to_string(),
        }
    }

    /// Success or Overshoot depending on whether `final_size` fits `target`.
    pub fn completed(
        source: &Path,
        original_size: u64,
        final_size: u64,
        output: &Path,
        target: u64,
    ) -> Self {
        if final_size > target {
            Self::Overshoot {
                source: source.to_path_buf(),
                original_size,
                final_size,
                output: output.to_path_buf(),
                target,
            }
        } else {
            Self::Success {
                source: source.to_path_buf(),
                original_size,
                final_size,
                output: output.to_path_buf(),
            }
        }
    }

    pub fn source(&self) -> &Path {
        match self {
            Self::Success { source, .. }
            | Self::Overshoot { source, .. }
            | Self::Skipped { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "optimized",
            Self::Overshoot { .. } => "over_budget",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

fn name_of(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name().unwrap_or_default().to_string_lossy()
}

impl fmt::Display for OutcomeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success {
                source,
                original_size,
                final_size,
                output,
            } => write!(
                f,
                "[OK] '{}' -> '{}' ({:.2}MB -> {:.2}MB)",
                name_of(source),
                name_of(output),
                SizeProbe::to_mb(*original_size),
                SizeProbe::to_mb(*final_size)
            ),
            Self::Overshoot {
                source,
                original_size,
                final_size,
                output,
                target,
            } => write!(
                f,
                "[OVER] '{}' -> '{}' ({:.2}MB -> {:.2}MB, still above {:.2}MB)",
                name_of(source),
                name_of(output),
                SizeProbe::to_mb(*original_size),
                SizeProbe::to_mb(*final_size),
                SizeProbe::to_mb(*target)
            ),
            Self::Skipped { source, reason } => {
                write!(f, "[SKIP] '{}': {}", name_of(source), reason)
            }
            Self::Failed { source, error } => {
                write!(f, "[ERROR] '{}': {}", name_of(source), error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_classification() {
        let image = MediaArtifact::from_path("/photos/IMG_001.JPG").unwrap();
        assert_eq!(image.kind(), MediaKind::Image);
        assert_eq!(image.stem(), "IMG_001");

        let video = MediaArtifact::from_path(PathBuf::from("clips/HeroWaves.mp4")).unwrap();
        assert_eq!(video.kind(), MediaKind::Video);
        assert_eq!(video.file_name(), "HeroWaves.mp4");

        assert!(MediaArtifact::from_path("notes.txt").is_err());
        assert!(MediaArtifact::from_path("README").is_err());
    }

    #[test]
    fn test_completed_splits_on_target() {
        let ok = OutcomeRecord::completed(Path::new("a.png"), 9, 4, Path::new("a.webp"), 4);
        assert_eq!(ok.status(), "optimized");

        let over = OutcomeRecord::completed(Path::new("a.png"), 9, 5, Path::new("a.webp"), 4);
        assert_eq!(over.status(), "over_budget");
        assert!(!over.is_failure());
    }

    #[test]
    fn test_outcome_lines() {
        let line = OutcomeRecord::completed(
            Path::new("/in/beach.png"),
            10 * 1024 * 1024,
            3 * 1024 * 1024,
            Path::new("/out/beach.webp"),
            4 * 1024 * 1024,
        )
        .to_string();
        assert_eq!(line, "[OK] 'beach.png' -> 'beach.webp' (10.00MB -> 3.00MB)");

        let failed = OutcomeRecord::failed(Path::new("/in/clip.mp4"), "boom").to_string();
        assert_eq!(failed, "[ERROR] 'clip.mp4': boom");
    }
}
