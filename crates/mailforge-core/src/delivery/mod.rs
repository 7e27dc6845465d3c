//! Delivery agents: the last hop of a message.
//!
//! An agent receives the envelope sender, the envelope recipients and the
//! serialized message. [`SmtpAgent`] submits to a server; the in-memory
//! agents keep what they receive for inspection.

mod memory;
mod smtp;

use thiserror::Error;

pub use memory::{ParsedMail, ParsingAgent, RecordingAgent, SentMail};
pub use smtp::SmtpAgent;

/// Errors raised by delivery agents.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The SMTP session failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailforge_smtp::Error),

    /// The runtime driving the session could not be started.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The agent refused the message.
    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Sends serialized messages.
pub trait DeliveryAgent: Send + Sync + std::fmt::Debug {
    /// Delivers `message` from `from` to every address in `recipients`.
    ///
    /// A call either succeeds for the whole recipient list or fails.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] describing the transport failure.
    fn send(&self, from: &str, recipients: &[String], message: &[u8]) -> Result<(), DeliveryError>;
}
