//! # Video Manifest
//!
//! Mappa sorgente → destinazione per il batch video.
//!
//! ```json
//! { "AboutSand.mp4": "about-sand.mp4", "HeroWaves.mp4": null }
//! ```
//!
//! `null` significa "stesso nome". Senza manifest, ogni video al primo livello
//! della directory di input mappa su se stesso. Le sorgenti mancanti non vengono
//! scartate qui: diventano item `Failed` nel batch.

use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct VideoManifest {
    entries: Vec<ManifestEntry>,
}

impl VideoManifest {
    /// Loads a manifest file, resolving names against the input and output directories
    pub async fn from_file(
        path: &Path,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, OptimizeError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OptimizeError::Setup(format!("Cannot read manifest {}: {}", path.display(), e))
        })?;
        Self::parse(&content, input_dir, output_dir)
    }

    pub fn parse(json: &str, input_dir: &Path, output_dir: &Path) -> Result<Self, OptimizeError> {
        let raw: BTreeMap<String, Option<String>> = serde_json::from_str(json)
            .map_err(|e| OptimizeError::Validation(format!("Invalid manifest: {}", e)))?;

        let entries = raw
            .into_iter()
            .map(|(input_name, output_name)| {
                let output_name = output_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| input_name.clone());
                ManifestEntry {
                    source: input_dir.join(&input_name),
                    destination: output_dir.join(output_name),
                }
            })
            .collect();

        let manifest = Self { entries };
        manifest.warn_on_duplicates();
        Ok(manifest)
    }

    /// Every top-level video of `input_dir`, keeping its name
    pub fn discover(input_dir: &Path, output_dir: &Path) -> Result<Self, OptimizeError> {
        let entries = FileManager::find_videos(input_dir)?
            .into_iter()
            .filter_map(|source| {
                let name = source.file_name()?.to_owned();
                Some(ManifestEntry {
                    destination: output_dir.join(name),
                    source,
                })
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Destinations claimed by more than one entry
    pub fn duplicate_destinations(&self) -> Vec<&Path> {
        let mut counts: HashMap<&Path, usize> = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.destination.as_path()).or_default() += 1;
        }

        let mut duplicates: Vec<&Path> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(path, _)| path)
            .collect();
        duplicates.sort();
        duplicates
    }

    fn warn_on_duplicates(&self) {
        for destination in self.duplicate_destinations() {
            warn!(
                "Several manifest entries write to {}; the last one to finish wins",
                destination.display()
            );
        }
    }
}

impl IntoIterator for VideoManifest {
    type Item = ManifestEntry;
    type IntoIter = std::vec::IntoIter<ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_manifest() {
        let json = r#"{
            "HeroWaves.mp4": "hero.mp4",
            "AboutSand.mp4": null,
            "FooterWaves.mp4": ""
        }"#;
        let manifest = VideoManifest::parse(json, Path::new("in"), Path::new("out")).unwrap();

        assert_eq!(
            manifest.entries(),
            &[
                ManifestEntry {
                    source: PathBuf::from("in/AboutSand.mp4"),
                    destination: PathBuf::from("out/AboutSand.mp4"),
                },
                ManifestEntry {
                    source: PathBuf::from("in/FooterWaves.mp4"),
                    destination: PathBuf::from("out/FooterWaves.mp4"),
                },
                ManifestEntry {
                    source: PathBuf::from("in/HeroWaves.mp4"),
                    destination: PathBuf::from("out/hero.mp4"),
                },
            ]
        );
        assert!(manifest.duplicate_destinations().is_empty());
    }

    #[test]
    fn test_duplicate_destinations_are_kept() {
        let json = r#"{ "a.mp4": "loop.mp4", "b.mp4": "loop.mp4", "c.mp4": null }"#;
        let manifest = VideoManifest::parse(json, Path::new("in"), Path::new("out")).unwrap();

        assert_eq!(manifest.entries().len(), 3);
        assert_eq!(manifest.duplicate_destinations(), vec![Path::new("out/loop.mp4")]);
    }

    #[test]
    fn test_invalid_manifest_is_rejected() {
        let err = VideoManifest::parse("[\"a.mp4\"]", Path::new("in"), Path::new("out")).unwrap_err();
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_discover_maps_videos_to_same_name() {
        let dir = TempDir::new().unwrap();
        for name in ["b.mov", "a.mp4", "poster.jpg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let out = dir.path().join("temp_h264");

        let manifest = VideoManifest::discover(dir.path(), &out).unwrap();
        let destinations: Vec<_> = manifest.into_iter().map(|e| e.destination).collect();
        assert_eq!(destinations, vec![out.join("a.mp4"), out.join("b.mov")]);
    }

    #[tokio::test]
    async fn test_missing_manifest_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = VideoManifest::from_file(&dir.path().join("videos.json"), dir.path(), dir.path())
            .await
            .unwrap_err();
        assert!(err.is_batch_fatal());
    }
}
