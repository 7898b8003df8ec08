//! # Web Media Budget Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione, budget di dimensione e validazione parametri
//! - `error`: Tipi di errore custom (per-item e fatali a livello di batch)
//! - `size_probe`: Misura della dimensione su disco, mai in cache
//! - `artifact`: Artifact sorgente, work item ed esiti
//! - `file_manager`: Discovery media e operazioni sui file
//! - `image_processor`: Riduzione immagini sotto un budget (ricerca qualità/risoluzione)
//! - `video_processor`: Transcodifica video a bitrate calcolato
//! - `semantic_gate`: Smistamento immagini per contenuto
//! - `optimizer`: Orchestratore del batch e worker pool
//! - `progress` / `json_output`: Report degli esiti
//! - `platform`: Risoluzione dei tool esterni
//!
//! ## Utilizzo:
//! ```ignore
//! use web_media_budget::{Config, MediaOptimizer};
//!
//! let optimizer = MediaOptimizer::new(Config::default())?;
//! let summary = optimizer.optimize_images(&input, &output).await?;
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod semantic_gate;
pub mod size_probe;
pub mod video_processor;

pub use artifact::{MediaArtifact, MediaKind, OutcomeRecord, WorkItem};
pub use config::{Config, SizeBudget};
pub use error::OptimizeError;
pub use image_processor::ImageSizeReducer;
pub use optimizer::{BatchSummary, MediaOptimizer, WorkerPool};
pub use semantic_gate::{GateSummary, SemanticGate};
pub use video_processor::VideoBitrateTranscoder;
