use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy of a split run. Only [`SplitError::Load`] aborts a run;
/// every other variant is confined to the partition or link job it came from.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Failed to load module '{file}': {source}")]
    Load { file: String, source: hyir::utils::Error },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialization(#[from] toml::ser::Error),

    /// A regenerated artifact does not have the shape it was generated with.
    #[error("Partition {partition} is structurally invalid: {reason}")]
    Structure { partition: usize, reason: String },

    /// Verification still fails after the repair pass.
    #[error("Partition {partition} has unrepairable linkage:\n{diagnostics}")]
    Linkage {
        partition: usize,
        diagnostics: String,
    },

    #[error("Link of partition {partition} failed: {reason}")]
    Link { partition: usize, reason: String },

    #[error("Module has no symbols to split")]
    EmptyModule,
}

impl SplitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SplitError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type SplitResult<T> = Result<T, SplitError>;
