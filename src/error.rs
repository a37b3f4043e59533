//! Error types for vizserver
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using VizError
pub type Result<T> = std::result::Result<T, VizError>;

/// Unified error type for vizserver operations
#[derive(Debug, Error)]
pub enum VizError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors (stream is out of sync after any of these)
    // -------------------------------------------------------------------------
    #[error("end of file before the {expected}-byte payload was complete")]
    ShortPayload { expected: usize },

    #[error("malformed payload length \"{0}\"")]
    MalformedLength(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Command Errors (reported back to the client, session continues)
    // -------------------------------------------------------------------------
    #[error("{0}")]
    UnknownOperation(String),

    #[error("{0}")]
    AmbiguousOperation(String),

    #[error("{0}")]
    WrongArgs(String),

    #[error("{0}")]
    Command(String),

    // -------------------------------------------------------------------------
    // Render / Encode Errors
    // -------------------------------------------------------------------------
    #[error("render failed: {0}")]
    Render(String),

    #[error("renderer is no longer usable: {0}")]
    RendererLost(String),

    #[error("encode failed: {0}")]
    Encode(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("response channel is closed")]
    ChannelClosed,
}

impl VizError {
    /// Whether the error ends the session.
    ///
    /// Everything else is a per-statement failure that is written back to the
    /// client as an error frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VizError::Io(_)
                | VizError::ShortPayload { .. }
                | VizError::MalformedLength(_)
                | VizError::PayloadTooLarge { .. }
                | VizError::RendererLost(_)
                | VizError::ChannelClosed
        )
    }
}
