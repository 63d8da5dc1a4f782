use strum::EnumIs;
use thiserror::Error;

/// A single parse failure with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParserError {
    pub message: String,
    pub start: usize,
    pub end: usize,
    pub file: Option<String>,
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}..{}: {}",
            self.file.as_deref().unwrap_or("<input>"),
            self.start,
            self.end,
            self.message
        )
    }
}

#[derive(Debug, EnumIs, Error)]
pub enum Error {
    /// The textual module could not be parsed.
    #[error("Failed to parse module: {}", join_errors(.errors))]
    ParserErrors { errors: Vec<ParserError> },

    /// The module file could not be read.
    #[error("I/O error while reading `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The parsed items do not form a consistent module.
    #[error("Invalid module: {0}")]
    InvalidModule(String),
}

fn join_errors(errors: &[ParserError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
