//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e la discovery dei media.
//!
//! ## Responsabilità:
//! - Discovery dei file media al primo livello di una directory (mai ricorsiva)
//! - Determinazione formato file (immagine vs video) tramite allow-list
//! - Creazione directory di output (errore fatale a livello batch)
//! - Spostamento file per il semantic gate
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP, TIFF
//! - **Video**: MP4, MOV, WebM, MKV, AVI
//!
//! ## Esempio:
//! ```ignore
//! let images = FileManager::find_images(Path::new("/path/to/media"))?;
//! ```

use crate::error::OptimizeError;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tiff"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi"];

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Top-level image files of `dir`, sorted by name
    pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>, OptimizeError> {
        Self::find_with(dir, Self::is_image)
    }

    /// Top-level video files of `dir`, sorted by name
    pub fn find_videos(dir: &Path) -> Result<Vec<PathBuf>, OptimizeError> {
        Self::find_with(dir, Self::is_video)
    }

    fn find_with(dir: &Path, accept: fn(&Path) -> bool) -> Result<Vec<PathBuf>, OptimizeError> {
        let mut files = Vec::new();

        // max_depth(1): entries of `dir` only, subdirectories are never entered
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| OptimizeError::Io(e.into()))?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if accept(path) {
                files.push(path.to_path_buf());
            } else {
                debug!("Ignoring unsupported file: {}", path.display());
            }
        }

        Ok(files)
    }

    /// Lowercased extension, if any
    pub fn extension_of(path: &Path) -> Option<String> {
        path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Check if a file is an image
    pub fn is_image(path: &Path) -> bool {
        Self::extension_of(path).map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Check if a file is a video
    pub fn is_video(path: &Path) -> bool {
        Self::extension_of(path).map_or(false, |ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Creates `dir` (and parents). Failure here stops the whole batch.
    pub fn ensure_dir(dir: &Path) -> Result<(), OptimizeError> {
        if dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(dir).map_err(|e| {
            OptimizeError::Setup(format!("Cannot create directory {}: {}", dir.display(), e))
        })
    }

    /// Moves `file` into `dir`, keeping its name. Falls back to copy+remove across devices.
    pub fn move_into(file: &Path, dir: &Path) -> Result<PathBuf, OptimizeError> {
        let name = file.file_name().ok_or_else(|| {
            OptimizeError::Validation(format!("Invalid file name: {}", file.display()))
        })?;
        let destination = dir.join(name);

        if std::fs::rename(file, &destination).is_err() {
            std::fs::copy(file, &destination)?;
            std::fs::remove_file(file)?;
        }

        Ok(destination)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discovery_filters_and_does_not_recurse() {
        let dir = TempDir::new().unwrap();
        for name in ["b.PNG", "a.jpg", "c.tiff", "notes.txt", "clip.mp4", "noext"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let nested = dir.path().join("nature-img");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("deep.jpg"), b"x").unwrap();
        // A directory with an image-like name is still not a file
        std::fs::create_dir(dir.path().join("folder.png")).unwrap();

        let images = FileManager::find_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.tiff"]);

        let videos = FileManager::find_videos(dir.path()).unwrap();
        assert_eq!(videos.len(), 1);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(FileManager::find_images(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_move_into() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("sorted");
        FileManager::ensure_dir(&target).unwrap();
        let file = dir.path().join("forest.jpg");
        std::fs::write(&file, b"pixels").unwrap();

        let moved = FileManager::move_into(&file, &target).unwrap();
        assert!(!file.exists());
        assert_eq!(std::fs::read(moved).unwrap(), b"pixels");
    }

    #[test]
    fn test_ensure_dir_fails_under_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let err = FileManager::ensure_dir(&blocker.join("out")).unwrap_err();
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_format_size_and_reduction() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(FileManager::calculate_reduction(200, 50), 75.0);
        assert_eq!(FileManager::calculate_reduction(0, 50), 0.0);
    }
}
