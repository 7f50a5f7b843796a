//! Crate-wide error taxonomy.
//!
//! Every failure here is fatal to the current run: the model loader, the
//! proposition compiler and the formula parser all abort construction of
//! the verification pipeline. The binary maps any `Error` to exit code 2.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The textual system declaration failed to parse or to elaborate.
    #[error("model: line {line}: {msg}")]
    ModelLoad { line: usize, msg: String },

    /// One or more atomic propositions could not be resolved against the
    /// model. All messages for the batch are reported together; no partial
    /// compilation result survives.
    #[error("{}", .0.join("\n"))]
    PropositionCompile(Vec<String>),

    /// The model exposes more than one initial configuration.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The LTL formula is malformed.
    #[error("formula: offset {offset}: {msg}")]
    FormulaParse { offset: usize, msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
