//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'integrazione con
//! pipeline di build e script esterni.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout (line-delimited)
//! - Converte gli `OutcomeRecord` in eventi serializzabili
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio batch (operazione, directory, numero di item)
//! - `item_complete`: Esito di un singolo item, nell'ordine di completamento
//! - `complete`: Fine batch con statistiche aggregate
//! - `gate_complete`: Fine smistamento semantico
//! - `error`: Errore fatale a livello di batch

use crate::artifact::OutcomeRecord;
use crate::progress::BatchTotals;
use crate::semantic_gate::GateSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        operation: String,
        input_dir: PathBuf,
        output_dir: PathBuf,
        total_files: usize,
        workers: usize,
    },

    #[serde(rename = "item_complete")]
    ItemComplete {
        path: PathBuf,
        status: String,
        output: Option<PathBuf>,
        original_size: Option<u64>,
        final_size: Option<u64>,
        target_size: Option<u64>,
        /// Skip reason or error text
        message: Option<String>,
        current: usize,
        total: usize,
    },

    #[serde(rename = "complete")]
    Complete {
        files_processed: usize,
        files_optimized: usize,
        files_over_budget: usize,
        files_skipped: usize,
        errors: usize,
        total_bytes_saved: u64,
        saved_percent: f64,
        duration_seconds: f64,
    },

    #[serde(rename = "gate_complete")]
    GateComplete {
        moved: usize,
        kept: usize,
        errors: usize,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(
        operation: &str,
        input_dir: PathBuf,
        output_dir: PathBuf,
        total_files: usize,
        workers: usize,
    ) -> Self {
        Self::Start {
            operation: operation.to_string(),
            input_dir,
            output_dir,
            total_files,
            workers,
        }
    }

    pub fn item_complete(outcome: &OutcomeRecord, current: usize, total: usize) -> Self {
        let (output, original_size, final_size, target_size, message) = match outcome {
            OutcomeRecord::Success {
                output,
                original_size,
                final_size,
                ..
            } => (Some(output.clone()), Some(*original_size), Some(*final_size), None, None),
            OutcomeRecord::Overshoot {
                output,
                original_size,
                final_size,
                target,
                ..
            } => (
                Some(output.clone()),
                Some(*original_size),
                Some(*final_size),
                Some(*target),
                None,
            ),
            OutcomeRecord::Skipped { reason, .. } => (None, None, None, None, Some(reason.clone())),
            OutcomeRecord::Failed { error, .. } => (None, None, None, None, Some(error.clone())),
        };

        Self::ItemComplete {
            path: outcome.source().to_path_buf(),
            status: outcome.status().to_string(),
            output,
            original_size,
            final_size,
            target_size,
            message,
            current,
            total,
        }
    }

    pub fn complete(totals: &BatchTotals, duration_seconds: f64) -> Self {
        Self::Complete {
            files_processed: totals.processed,
            files_optimized: totals.optimized,
            files_over_budget: totals.over_budget,
            files_skipped: totals.skipped,
            errors: totals.failed,
            total_bytes_saved: totals.bytes_saved(),
            saved_percent: totals.saved_percent(),
            duration_seconds,
        }
    }

    pub fn gate_complete(summary: &GateSummary) -> Self {
        Self::GateComplete {
            moved: summary.moved,
            kept: summary.kept,
            errors: summary.errors,
        }
    }

    pub fn error(message: String) -> Self {
        Self::Error { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_item_complete_event() {
        let outcome = OutcomeRecord::completed(
            Path::new("in/HeroWaves.mp4"),
            40_000_000,
            5_300_000,
            Path::new("out/hero-waves.mp4"),
            5_242_880,
        );
        let value = serde_json::to_value(JsonMessage::item_complete(&outcome, 2, 3)).unwrap();

        assert_eq!(value["type"], "item_complete");
        assert_eq!(value["status"], "over_budget");
        assert_eq!(value["target_size"], 5_242_880);
        assert_eq!(value["current"], 2);
        assert!(value["message"].is_null());
    }

    #[test]
    fn test_failed_item_carries_error_text() {
        let outcome = OutcomeRecord::failed(Path::new("a.png"), "Image decode error: bad header");
        let value = serde_json::to_value(JsonMessage::item_complete(&outcome, 1, 1)).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["message"], "Image decode error: bad header");
        assert!(value["output"].is_null());
    }

    #[test]
    fn test_complete_event_tag() {
        let json = serde_json::to_string(&JsonMessage::complete(&BatchTotals::default(), 0.5)).unwrap();
        assert!(json.starts_with("{\"type\":\"complete\""));
    }
}
