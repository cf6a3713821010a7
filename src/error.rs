//! Error types for the promo video pipeline.

use thiserror::Error;

/// Library-level error type. Every variant is terminal for the step that
/// raised it; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Script generation failed: {0}")]
    Generation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("No usable media: {0}")]
    NoUsableMedia(String),

    #[error("Media read error for {item}: {reason}")]
    MediaRead { item: String, reason: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("No {0} available yet; run the previous step first")]
    MissingStage(&'static str),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    /// The tool could not be started at all, as opposed to rejecting its input.
    #[error("External tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn media_read(item: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Error::MediaRead {
            item: item.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
