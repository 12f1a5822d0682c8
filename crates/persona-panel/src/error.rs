//! Error types for the persona panel.

use thiserror::Error;

/// Errors returned by the panel's public operations.
///
/// Failures of an individual persona's oracle call are never represented here.
/// They are carried as error-marked reply text inside the [`Turn`](crate::Turn),
/// so a single broken persona cannot fail a whole turn.
#[derive(Debug, Error)]
pub enum PanelError {
    /// The user utterance was empty or whitespace only.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation was called in a state that does not allow it.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The persona set is empty, has blank fields, or repeats a name.
    #[error("Invalid persona registry: {0}")]
    InvalidRegistry(String),

    /// A prompt template failed to render.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A configuration value could not be used.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PanelError {
    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a precondition error.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid JSON: {err}"))
    }
}

/// A type alias for `Result<T, PanelError>`.
pub type Result<T> = std::result::Result<T, PanelError>;
