//! # Optimizer Module
//!
//! Orchestrazione del batch, separata in sottomoduli:
//! - `media_optimizer`: Orchestratore principale (discovery, dispatch, report)
//! - `worker_pool`: Pool a concorrenza limitata con esiti non ordinati
//! - `manifest`: Mappa sorgente → destinazione per il batch video

pub mod manifest;
pub mod media_optimizer;
pub mod worker_pool;

pub use manifest::{ManifestEntry, VideoManifest};
pub use media_optimizer::{BatchSummary, MediaOptimizer};
pub use worker_pool::{JobPanicked, WorkerPool};
