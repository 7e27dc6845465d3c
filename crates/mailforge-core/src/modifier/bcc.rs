use super::{Envelope, Modifier};
use crate::error::Result;

/// Adds a recipient to every message, typically an archive address.
///
/// The message headers are left alone, so the address acts as a blind copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRecipient {
    address: String,
}

impl AddRecipient {
    /// Creates a modifier adding `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Returns the added address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Modifier for AddRecipient {
    fn modify(&self, mut envelope: Envelope) -> Result<Envelope> {
        if !envelope.recipients.iter().any(|r| r == &self.address) {
            envelope.recipients.push(self.address.clone());
        }
        Ok(envelope)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::modifier::Payload;

    #[test]
    fn test_appends_once() {
        let modifier = AddRecipient::new("archive@example.com");
        let envelope = Envelope::new("a@x.com", vec!["b@x.com".into()], Payload::Raw(b"m".to_vec()));
        let out = modifier.modify(envelope).unwrap();
        assert_eq!(out.recipients, ["b@x.com", "archive@example.com"]);
        let again = modifier.modify(out).unwrap();
        assert_eq!(again.recipients.len(), 2);
        assert_eq!(again.payload, Payload::Raw(b"m".to_vec()));
    }
}
