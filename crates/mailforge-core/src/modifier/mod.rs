//! Post-composition transformations.
//!
//! A [`Modifier`] receives the [`Envelope`] of a composed message and
//! returns a new one. Modifiers may rewrite the sender, the recipients, the
//! message, or all three; [`ChainModifier`] runs several in order, each one
//! seeing the output of the previous.

mod bcc;
mod dkim;
mod pgp;

use std::fmt;
use std::sync::Arc;

use mailforge_mime::Part;

use crate::error::Result;

pub use bcc::AddRecipient;
pub use dkim::{DEFAULT_SIGNED_HEADERS, DkimSigner};
pub use pgp::{Encryptor, GpgEncryptor, PgpEncryptor};

/// The message as it travels through the modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A part tree, not yet serialized.
    Mime(Part),
    /// Serialized message bytes.
    Raw(Vec<u8>),
}

impl Payload {
    /// Serializes the payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Mime(part) => part.to_bytes(),
            Self::Raw(bytes) => bytes.clone(),
        }
    }

    /// Serializes the payload, consuming it.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Mime(part) => part.to_bytes(),
            Self::Raw(bytes) => bytes,
        }
    }

    /// Returns the payload as a part tree, parsing raw bytes if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if raw bytes are not a readable message.
    pub fn into_part(self) -> Result<Part> {
        match self {
            Self::Mime(part) => Ok(part),
            Self::Raw(bytes) => Ok(Part::parse(&bytes)?),
        }
    }
}

/// Envelope sender, envelope recipients and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `MAIL FROM` address.
    pub mail_from: String,
    /// `RCPT TO` addresses.
    pub recipients: Vec<String>,
    /// The message.
    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(mail_from: impl Into<String>, recipients: Vec<String>, payload: Payload) -> Self {
        Self {
            mail_from: mail_from.into(),
            recipients,
            payload,
        }
    }
}

/// Transforms a composed message before delivery.
pub trait Modifier: Send + Sync + fmt::Debug {
    /// Returns the transformed envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the transformation fails; the message must not
    /// be sent in that case.
    fn modify(&self, envelope: Envelope) -> Result<Envelope>;
}

/// Applies modifiers in order.
#[derive(Debug, Clone, Default)]
pub struct ChainModifier {
    modifiers: Vec<Arc<dyn Modifier>>,
}

impl ChainModifier {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a modifier.
    #[must_use]
    pub fn with(mut self, modifier: impl Modifier + 'static) -> Self {
        self.push(Arc::new(modifier));
        self
    }

    /// Appends a shared modifier.
    pub fn push(&mut self, modifier: Arc<dyn Modifier>) {
        self.modifiers.push(modifier);
    }

    /// Returns the number of modifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }
}

impl Modifier for ChainModifier {
    fn modify(&self, envelope: Envelope) -> Result<Envelope> {
        self.modifiers
            .iter()
            .try_fold(envelope, |envelope, modifier| modifier.modify(envelope))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Debug)]
    struct Tag(&'static str);

    impl Modifier for Tag {
        fn modify(&self, mut envelope: Envelope) -> Result<Envelope> {
            let mut bytes = envelope.payload.into_bytes();
            bytes.extend_from_slice(self.0.as_bytes());
            envelope.payload = Payload::Raw(bytes);
            Ok(envelope)
        }
    }

    #[derive(Debug)]
    struct Fail;

    impl Modifier for Fail {
        fn modify(&self, _envelope: Envelope) -> Result<Envelope> {
            Err(Error::Encryption("no keys".into()))
        }
    }

    #[test]
    fn test_chain_runs_in_order() {
        let chain = ChainModifier::new().with(Tag("a")).with(Tag("b"));
        let out = chain
            .modify(Envelope::new("x@x.com", vec![], Payload::Raw(b">".to_vec())))
            .unwrap();
        assert_eq!(out.payload, Payload::Raw(b">ab".to_vec()));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_chain_stops_on_error() {
        let chain = ChainModifier::new().with(Fail).with(Tag("never"));
        let err = chain
            .modify(Envelope::new("x@x.com", vec![], Payload::Raw(Vec::new())))
            .unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let envelope = Envelope::new("x@x.com", vec!["y@x.com".into()], Payload::Raw(b"m".to_vec()));
        assert_eq!(ChainModifier::new().modify(envelope.clone()).unwrap(), envelope);
    }
}
