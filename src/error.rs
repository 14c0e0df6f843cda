use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a single audit. Everything else the engine encounters
/// degrades into findings or is simply absent from the result.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("failed to read manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("audit worker unavailable: {0}")]
    Worker(String),
}

impl From<image::ImageError> for AuditError {
    fn from(err: image::ImageError) -> Self {
        AuditError::Decode(err.to_string())
    }
}
