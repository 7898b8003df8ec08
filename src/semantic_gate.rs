//! # Semantic Gate Module
//!
//! Pre-smistamento delle immagini per contenuto, prima dell'ottimizzazione.
//!
//! ## Responsabilità:
//! - Confronto esplicito tra due ipotesi testuali (positiva vs negativa)
//! - Spostamento delle immagini "positive" in una sottodirectory dedicata
//! - Le immagini negative o non classificabili restano dove sono
//!
//! Il classificatore vero e proprio (un modello vision-language pre-addestrato)
//! è esterno: qui si consuma solo il suo punteggio tramite `SemanticScorer`.
//! `CommandScorer` lo invoca come processo separato:
//!
//! ```text
//! <program> [args] --image PATH --positive TEXT --negative TEXT
//! stdout: {"positive": 0.83, "negative": 0.17}
//! ```
//!
//! Un errore del classificatore non è mai fatale per il batch: il file viene
//! lasciato al suo posto e contato tra gli errori. L'unico errore fatale è
//! l'impossibilità di creare la directory di destinazione.

use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_TARGET_SUBDIR: &str = "nature-img";

/// The two categories an image is scored against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypotheses {
    pub positive: String,
    pub negative: String,
}

impl Default for Hypotheses {
    fn default() -> Self {
        Self {
            positive: "nature, landscape, trees, ocean, beach, flowers, forest".to_string(),
            negative: "city, building, indoor, text, screenshot, urban".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HypothesisScores {
    pub positive: f64,
    pub negative: f64,
}

impl HypothesisScores {
    /// Ties go to the negative side.
    pub fn favours_positive(&self) -> bool {
        self.positive > self.negative
    }
}

/// Black-box image scorer
pub trait SemanticScorer: Send + Sync {
    fn score(&self, image: &Path, hypotheses: &Hypotheses)
        -> Result<HypothesisScores, OptimizeError>;
}

/// Scores images by running an external program once per image
pub struct CommandScorer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandScorer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn parse(stdout: &str) -> Result<HypothesisScores, OptimizeError> {
        serde_json::from_str(stdout.trim()).map_err(|e| {
            OptimizeError::Classifier(format!("Unexpected scorer output '{}': {}", stdout.trim(), e))
        })
    }
}

impl SemanticScorer for CommandScorer {
    fn score(
        &self,
        image: &Path,
        hypotheses: &Hypotheses,
    ) -> Result<HypothesisScores, OptimizeError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--image")
            .arg(image)
            .arg("--positive")
            .arg(&hypotheses.positive)
            .arg("--negative")
            .arg(&hypotheses.negative)
            .output()
            .map_err(|e| {
                OptimizeError::Classifier(format!(
                    "Failed to execute {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(OptimizeError::Classifier(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Counts for one gate run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateSummary {
    pub moved: usize,
    pub kept: usize,
    pub errors: usize,
}

pub struct SemanticGate {
    scorer: Arc<dyn SemanticScorer>,
    hypotheses: Hypotheses,
}

impl SemanticGate {
    pub fn new(scorer: Arc<dyn SemanticScorer>, hypotheses: Hypotheses) -> Self {
        Self { scorer, hypotheses }
    }

    /// True when the positive hypothesis scores strictly higher
    pub fn classify(&self, image: &Path) -> Result<bool, OptimizeError> {
        let scores = self.scorer.score(image, &self.hypotheses)?;
        debug!(
            "{}: positive {:.3} / negative {:.3}",
            image.display(),
            scores.positive,
            scores.negative
        );
        Ok(scores.favours_positive())
    }

    /// Partitions the top-level images of `dir`, moving positives into `dir/target_subdir`.
    pub fn run(&self, dir: &Path, target_subdir: &str) -> Result<GateSummary, OptimizeError> {
        let target_dir = dir.join(target_subdir);
        FileManager::ensure_dir(&target_dir)?;

        let images = FileManager::find_images(dir)?;
        info!("Classifying {} images in {}", images.len(), dir.display());

        let mut summary = GateSummary::default();
        for image in images {
            let name = image.file_name().unwrap_or_default().to_string_lossy().into_owned();

            match self.classify(&image) {
                Ok(true) => match FileManager::move_into(&image, &target_dir) {
                    Ok(_) => {
                        info!("{} -> {}", name, target_subdir);
                        summary.moved += 1;
                    }
                    Err(e) => {
                        warn!("Could not move {}: {}", name, e);
                        summary.errors += 1;
                    }
                },
                Ok(false) => {
                    debug!("{}: kept", name);
                    summary.kept += 1;
                }
                Err(e) => {
                    warn!("Error classifying {}: {}", name, e);
                    summary.errors += 1;
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Scores by file name: "forest*" positive, "broken*" errors, everything else negative
    struct NameScorer;

    impl SemanticScorer for NameScorer {
        fn score(
            &self,
            image: &Path,
            _hypotheses: &Hypotheses,
        ) -> Result<HypothesisScores, OptimizeError> {
            let name = image.file_name().unwrap().to_string_lossy();
            if name.starts_with("broken") {
                return Err(OptimizeError::Classifier("cannot identify image file".into()));
            }
            let positive = if name.starts_with("forest") { 0.9 } else { 0.2 };
            Ok(HypothesisScores {
                positive,
                negative: 1.0 - positive,
            })
        }
    }

    #[test]
    fn test_gate_routes_positives_only() {
        let dir = TempDir::new().unwrap();
        for name in ["forest.jpg", "forest2.png", "office.jpg", "broken.jpg", "readme.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let gate = SemanticGate::new(Arc::new(NameScorer), Hypotheses::default());
        let summary = gate.run(dir.path(), DEFAULT_TARGET_SUBDIR).unwrap();

        assert_eq!(summary, GateSummary { moved: 2, kept: 1, errors: 1 });
        let target = dir.path().join(DEFAULT_TARGET_SUBDIR);
        assert!(target.join("forest.jpg").exists());
        assert!(target.join("forest2.png").exists());
        assert!(dir.path().join("office.jpg").exists());
        assert!(dir.path().join("broken.jpg").exists());
        assert!(dir.path().join("readme.txt").exists());
    }

    #[test]
    fn test_rerun_does_not_descend_into_target() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("forest.jpg"), b"x").unwrap();
        let gate = SemanticGate::new(Arc::new(NameScorer), Hypotheses::default());

        gate.run(dir.path(), DEFAULT_TARGET_SUBDIR).unwrap();
        let second = gate.run(dir.path(), DEFAULT_TARGET_SUBDIR).unwrap();
        assert_eq!(second, GateSummary::default());
    }

    #[test]
    fn test_target_dir_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULT_TARGET_SUBDIR), b"not a dir").unwrap();
        let gate = SemanticGate::new(Arc::new(NameScorer), Hypotheses::default());

        let err = gate.run(dir.path(), DEFAULT_TARGET_SUBDIR).unwrap_err();
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_comparison_is_explicit() {
        let tie = HypothesisScores { positive: 0.5, negative: 0.5 };
        assert!(!tie.favours_positive());
        let positive = HypothesisScores { positive: 0.51, negative: 0.49 };
        assert!(positive.favours_positive());
    }

    #[test]
    fn test_scorer_output_parsing() {
        let scores = CommandScorer::parse("{\"positive\": 0.7, \"negative\": 0.3}\n").unwrap();
        assert_eq!(scores.positive, 0.7);
        assert!(matches!(
            CommandScorer::parse("Traceback (most recent call last)"),
            Err(OptimizeError::Classifier(_))
        ));
    }

    #[test]
    fn test_missing_scorer_program_is_a_classifier_error() {
        let scorer = CommandScorer::new("definitely-not-a-real-scorer-4821", vec![]);
        let err = scorer
            .score(Path::new("forest.jpg"), &Hypotheses::default())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Classifier(_)));
    }
}
