//! Error types for the composition engine.

use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::markup::MarkupError;
use crate::template::RenderError;

/// Errors that can occur while composing or sending a message.
#[derive(Debug, Error)]
pub enum Error {
    /// Template rendering failed or the requested format is undeclared.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Body content cannot be represented in any usable charset.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// No envelope sender or recipients could be resolved at send time.
    #[error("Missing header: {0}")]
    MissingHeader(String),

    /// The structure references an unknown component or container kind.
    #[error("Unsupported structure: {0}")]
    UnsupportedStructure(String),

    /// The structure resolved to no parts at all.
    #[error("Message structure produced no content")]
    EmptyMessage,

    /// The encryption modifier failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// The signing modifier failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The delivery agent failed.
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Structured markup was required but could not be parsed.
    #[error("Markup error: {0}")]
    Markup(#[from] MarkupError),

    /// MIME construction failed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailforge_mime::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
