//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` per categorizzare gli errori di un singolo item
//!   e quelli fatali a livello di batch
//! - Conserva il messaggio originale dei tool esterni (ffmpeg, cwebp, ffprobe)
//! - Integra con `thiserror` per la conversione automatica da errori standard
//!
//! ## Categorie di errori:
//! - Per-item (recuperabili): `Io`, `Image`, `FFmpeg`, `Probe`, `Encoder`,
//!   `InvalidDuration`, `Classifier`, `SourceNotFound`
//! - Batch (fatali): `Setup`, `MissingDependency`, `Validation`
//!
//! Gli errori per-item non escono mai dal confine dell'item: vengono convertiti
//! in `OutcomeRecord::Failed` dal worker che li ha prodotti.

/// Custom error types for size-constrained media processing
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Encoder stderr, kept verbatim
    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Image encoder error: {0}")]
    Encoder(String),

    #[error("Invalid clip duration: {0}")]
    InvalidDuration(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Configuration error: {0}")]
    Validation(String),

    #[error("Batch setup failed: {0}")]
    Setup(String),
}

impl OptimizeError {
    /// True for errors that must stop the batch before any work is dispatched.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::Setup(_) | Self::MissingDependency(_) | Self::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_message_is_preserved() {
        let stderr = "[h264_nvenc @ 0x55] No capable devices found";
        let err = OptimizeError::FFmpeg(stderr.to_string());
        assert!(err.to_string().ends_with(stderr));
    }

    #[test]
    fn test_batch_fatal_classification() {
        assert!(OptimizeError::Setup("cannot create output".into()).is_batch_fatal());
        assert!(OptimizeError::MissingDependency("ffmpeg".into()).is_batch_fatal());
        assert!(!OptimizeError::InvalidDuration("0".into()).is_batch_fatal());
        assert!(!OptimizeError::SourceNotFound("a.mp4".into()).is_batch_fatal());
    }
}
