use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing training data.
///
/// Faults local to one annotation line or one image are recovered at that
/// granularity by the caller (logged and counted); only artifact-level I/O
/// failures are allowed to end a run.
#[derive(Error, Debug)]
pub enum PrepError {
    #[error("annotation line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("region has zero dynamic range")]
    DegenerateRegion,

    #[error("failed to read image {path}: {source}")]
    ImageAccess {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PrepError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}

/// Result type for data preparation operations
pub type PrepResult<T> = std::result::Result<T, PrepError>;
