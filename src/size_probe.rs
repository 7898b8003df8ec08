//! Byte/megabyte measurement of artifacts on disk. Never cached: every call
//! hits the filesystem, so a re-encoded output is always re-measured.

use crate::config::BYTES_PER_MB;
use crate::error::OptimizeError;
use std::path::Path;

pub struct SizeProbe;

impl SizeProbe {
    /// Current size of `path` in bytes
    pub fn bytes(path: &Path) -> Result<u64, OptimizeError> {
        Ok(std::fs::metadata(path)?.len())
    }

    pub fn to_mb(bytes: u64) -> f64 {
        bytes as f64 / BYTES_PER_MB as f64
    }
}
