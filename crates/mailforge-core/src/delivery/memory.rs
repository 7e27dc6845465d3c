//! In-memory agents for tests and dry runs.

use std::sync::{Arc, Mutex, PoisonError};

use mailforge_mime::{Charset, Part};

use super::{DeliveryAgent, DeliveryError};

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    /// Envelope sender.
    pub from: String,
    /// Envelope recipients.
    pub recipients: Vec<String>,
    /// The message as handed to the agent.
    pub message: Vec<u8>,
}

impl SentMail {
    /// The message as text, replacing invalid UTF-8.
    #[must_use]
    pub fn message_text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }
}

/// Keeps every message it is asked to send.
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct RecordingAgent {
    sent: Arc<Mutex<Vec<SentMail>>>,
}

impl RecordingAgent {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forgets everything sent so far.
    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DeliveryAgent for RecordingAgent {
    fn send(&self, from: &str, recipients: &[String], message: &[u8]) -> Result<(), DeliveryError> {
        tracing::info!(from, recipients = recipients.len(), "recorded message");
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMail {
                from: from.to_string(),
                recipients: recipients.to_vec(),
                message: message.to_vec(),
            });
        Ok(())
    }
}

/// A delivery broken down for assertions.
#[derive(Debug, Clone)]
pub struct ParsedMail {
    /// The raw delivery.
    pub sent: SentMail,
    /// The parsed message.
    pub part: Part,
    /// `From` header.
    pub from: Option<String>,
    /// `To` header.
    pub to: Option<String>,
    /// `Date` header.
    pub date: Option<String>,
    /// `Message-ID` header.
    pub message_id: Option<String>,
    /// `Subject` header.
    pub subject: Option<String>,
    /// Decoded first `text/plain` part.
    pub plain: Option<String>,
    /// Decoded first `text/html` part.
    pub html: Option<String>,
}

impl ParsedMail {
    fn parse(sent: SentMail) -> Result<Self, DeliveryError> {
        let part = Part::parse(&sent.message)
            .map_err(|e| DeliveryError::Rejected(format!("unparseable message: {e}")))?;
        let header = |name: &str| part.headers.get(name).map(str::to_string);
        Ok(Self {
            from: header("from"),
            to: header("to"),
            date: header("date"),
            message_id: header("message-id"),
            subject: header("subject"),
            plain: decoded_text(&part, "text/plain"),
            html: decoded_text(&part, "text/html"),
            sent,
            part,
        })
    }
}

fn decoded_text(part: &Part, mime_type: &str) -> Option<String> {
    let leaf = part
        .walk()
        .into_iter()
        .find(|p| !p.is_multipart() && p.content_type().mime_type() == mime_type)?;
    let bytes = leaf.decoded_body().ok()?;
    let charset = leaf
        .content_type()
        .charset()
        .and_then(|c| c.parse::<Charset>().ok())
        .unwrap_or(Charset::Utf8);
    Some(
        charset
            .decode(&bytes)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned()),
    )
}

/// Keeps every message it is asked to send, parsed.
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct ParsingAgent {
    received: Arc<Mutex<Vec<ParsedMail>>>,
}

impl ParsingAgent {
    /// Creates an empty agent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything received so far.
    #[must_use]
    pub fn emails(&self) -> Vec<ParsedMail> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the most recent delivery.
    #[must_use]
    pub fn last(&self) -> Option<ParsedMail> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl DeliveryAgent for ParsingAgent {
    fn send(&self, from: &str, recipients: &[String], message: &[u8]) -> Result<(), DeliveryError> {
        let parsed = ParsedMail::parse(SentMail {
            from: from.to_string(),
            recipients: recipients.to_vec(),
            message: message.to_vec(),
        })?;
        tracing::info!(from, recipients = recipients.len(), "parsed message");
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(parsed);
        Ok(())
    }
}
