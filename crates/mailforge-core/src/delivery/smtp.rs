//! Submission over SMTP.

use mailforge_smtp::SmtpOptions;

use super::{DeliveryAgent, DeliveryError};

/// Submits each message in its own SMTP session.
///
/// Each send builds a current-thread runtime and blocks on it, so this
/// agent must not be called from within an async context.
#[derive(Debug, Clone, Default)]
pub struct SmtpAgent {
    options: SmtpOptions,
}

impl SmtpAgent {
    /// Creates an agent for the given server.
    #[must_use]
    pub const fn new(options: SmtpOptions) -> Self {
        Self { options }
    }

    /// Returns the connection options.
    #[must_use]
    pub const fn options(&self) -> &SmtpOptions {
        &self.options
    }
}

impl DeliveryAgent for SmtpAgent {
    fn send(&self, from: &str, recipients: &[String], message: &[u8]) -> Result<(), DeliveryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DeliveryError::Runtime(e.to_string()))?;

        tracing::info!(
            host = %self.options.host,
            port = self.options.port,
            from,
            recipients = recipients.len(),
            bytes = message.len(),
            "submitting message"
        );
        runtime.block_on(mailforge_smtp::submit(&self.options, from, recipients, message))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_envelope_fails_before_connecting() {
        let agent = SmtpAgent::new(SmtpOptions::default());
        let err = agent.send("a@example.com", &[], b"x").unwrap_err();
        assert!(matches!(err, DeliveryError::Smtp(mailforge_smtp::Error::NoRecipients)));
    }
}
