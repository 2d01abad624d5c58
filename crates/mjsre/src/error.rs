use thiserror::Error;

use crate::engine::{EngineErrors, SpeechError};

/// Everything that can make a request fail.
///
/// A request either completes or fails at the first fault; there is no partial output.
#[derive(Debug, Error)]
pub enum Error {
    /// The typesetting engine reported one or more errors.
    #[error("typesetting failed: {0}")]
    Engine(#[from] EngineErrors),
    /// The typesetting engine returned no MathML, although it is always requested.
    #[error("No MathML found. Please check the typesetter configuration")]
    MissingMathml,
    /// The typesetting engine returned no node object for any output.
    #[error("No suitable output found. Please check the typesetter configuration")]
    NoNodeOutput,
    #[error("speech engine failed: {0}")]
    Speech(#[from] SpeechError),
    #[error("invalid semantic tree: {0}")]
    Semantic(String),
    #[error("failed to rewrite markup: {0}")]
    Markup(String),
}

impl Error {
    /// The error messages in the shape the typesetting engine reports them.
    ///
    /// Engine failures keep their original message list; every other error becomes a single
    /// message.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Error::Engine(errors) => errors.0.clone(),
            other => vec![other.to_string()],
        }
    }
}
