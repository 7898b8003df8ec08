//! # Progress Reporting and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e il riepilogo di un batch.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` (su stderr, nascosta in modalità JSON)
//! - Una riga di esito per item, stampata appena l'item termina
//! - Tracking statistiche: ottimizzati, fuori budget, saltati, falliti, byte
//! - Report finale con percentuale di riduzione
//!
//! ## Visual feedback:
//! ```text
//! [OK] 'beach.png' -> 'beach.webp' (12.40MB -> 3.81MB)
//! ⠋ [00:00:42] [=========>------------------------------] 12/50 (24%) beach.png
//! ```
//!
//! L'ordine delle righe è l'ordine di completamento, non quello di sottomissione.

use crate::artifact::OutcomeRecord;
use crate::file_manager::FileManager;
use crate::json_output::JsonMessage;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Aggregated counts for one batch
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchTotals {
    pub processed: usize,
    pub optimized: usize,
    pub over_budget: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Sources of produced outputs only
    pub original_bytes: u64,
    pub final_bytes: u64,
}

impl BatchTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &OutcomeRecord) {
        self.processed += 1;
        match outcome {
            OutcomeRecord::Success {
                original_size,
                final_size,
                ..
            } => {
                self.optimized += 1;
                self.add_bytes(*original_size, *final_size);
            }
            OutcomeRecord::Overshoot {
                original_size,
                final_size,
                ..
            } => {
                self.over_budget += 1;
                self.add_bytes(*original_size, *final_size);
            }
            OutcomeRecord::Skipped { .. } => self.skipped += 1,
            OutcomeRecord::Failed { .. } => self.failed += 1,
        }
    }

    fn add_bytes(&mut self, original: u64, produced: u64) {
        self.original_bytes += original;
        self.final_bytes += produced;
    }

    pub fn bytes_saved(&self) -> u64 {
        self.original_bytes.saturating_sub(self.final_bytes)
    }

    pub fn saved_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_bytes, self.final_bytes)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} | Optimized: {} | Over budget: {} | Skipped: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.processed,
            self.optimized,
            self.over_budget,
            self.skipped,
            self.failed,
            FileManager::format_size(self.bytes_saved()),
            self.saved_percent()
        )
    }
}

/// Per-batch reporter: progress bar, outcome lines, JSON events
pub struct ProgressReporter {
    bar: ProgressBar,
    json_output: bool,
    total: usize,
    totals: BatchTotals,
}

impl ProgressReporter {
    pub fn new(total: usize, json_output: bool) -> Self {
        let bar = if json_output {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            ) {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };

        Self {
            bar,
            json_output,
            total,
            totals: BatchTotals::new(),
        }
    }

    /// Records one outcome and prints exactly one line for it.
    pub fn report(&mut self, outcome: &OutcomeRecord) {
        self.totals.record(outcome);

        if self.json_output {
            JsonMessage::item_complete(outcome, self.totals.processed, self.total).emit();
        } else {
            self.bar.suspend(|| println!("{}", outcome));
            self.bar.set_message(
                outcome
                    .source()
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .into_owned(),
            );
        }
        self.bar.inc(1);
    }

    /// Closes the bar and hands back the totals
    pub fn finish(self) -> BatchTotals {
        if self.json_output {
            self.bar.finish_and_clear();
        } else {
            self.bar.finish_with_message(self.totals.format_summary());
        }
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sample_outcomes() -> Vec<OutcomeRecord> {
        vec![
            OutcomeRecord::completed(Path::new("a.png"), 1000, 400, Path::new("a.webp"), 500),
            OutcomeRecord::completed(Path::new("b.png"), 1000, 600, Path::new("b.webp"), 500),
            OutcomeRecord::skipped(Path::new("c.png"), "already below threshold"),
            OutcomeRecord::failed(Path::new("d.png"), "decode error"),
        ]
    }

    #[test]
    fn test_totals_record_every_status() {
        let mut totals = BatchTotals::new();
        for outcome in sample_outcomes() {
            totals.record(&outcome);
        }

        assert_eq!(totals.processed, 4);
        assert_eq!(totals.optimized, 1);
        assert_eq!(totals.over_budget, 1);
        assert_eq!(totals.skipped, 1);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.bytes_saved(), 1000);
        assert_eq!(totals.saved_percent(), 50.0);
        assert!(totals.format_summary().contains("Over budget: 1"));
    }

    #[test]
    fn test_reporter_counts_match_outcomes() {
        let outcomes = sample_outcomes();
        let mut reporter = ProgressReporter::new(outcomes.len(), true);
        for outcome in &outcomes {
            reporter.report(outcome);
        }
        let totals = reporter.finish();
        assert_eq!(totals.processed, 4);
        assert_eq!(totals.failed, 1);
    }

    #[test]
    fn test_empty_totals() {
        let totals = BatchTotals::default();
        assert_eq!(totals.saved_percent(), 0.0);
        assert_eq!(totals.bytes_saved(), 0);
    }
}
