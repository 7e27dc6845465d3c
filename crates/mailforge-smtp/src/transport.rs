//! One-shot message submission.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::command::Address;
use crate::error::{Error, Result};
use crate::stream::{connect, connect_tls};

/// Connection security.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Plain TCP.
    #[default]
    None,
    /// Plain TCP upgraded with STARTTLS.
    StartTls,
    /// Implicit TLS.
    Tls,
}

/// Where and how to submit messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpOptions {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connection security.
    pub security: Security,
    /// Login name, if the server requires authentication.
    pub username: Option<String>,
    /// Password for `username`.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Name announced in EHLO.
    pub hello: String,
    /// Upper bound for the whole session.
    #[serde(with = "seconds")]
    pub timeout: Duration,
}

impl Default for SmtpOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            security: Security::None,
            username: None,
            password: None,
            hello: "localhost".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Opens a session, submits one message to all recipients, and quits.
///
/// # Errors
///
/// Returns the first connection, protocol, or rejection error; nothing is
/// retried.
pub async fn submit(
    options: &SmtpOptions,
    from: &str,
    recipients: &[String],
    message: &[u8],
) -> Result<()> {
    if recipients.is_empty() {
        return Err(Error::NoRecipients);
    }
    let from = Address::new(from)?;
    let recipients = recipients
        .iter()
        .map(|r| Address::new(r.as_str()))
        .collect::<Result<Vec<_>>>()?;

    tokio::time::timeout(options.timeout, session(options, from, recipients, message))
        .await
        .map_err(|_| Error::Timeout(options.timeout))?
}

async fn session(
    options: &SmtpOptions,
    from: Address,
    recipients: Vec<Address>,
    message: &[u8],
) -> Result<()> {
    tracing::debug!(host = %options.host, port = options.port, security = ?options.security, "connecting");
    let stream = match options.security {
        Security::Tls => connect_tls(&options.host, options.port).await?,
        Security::None | Security::StartTls => connect(&options.host, options.port).await?,
    };

    let mut client = Client::from_stream(stream).await?.ehlo(&options.hello).await?;
    if options.security == Security::StartTls {
        client = client.starttls(&options.host, &options.hello).await?;
    }
    if let Some(username) = &options.username {
        let password = options.password.as_deref().unwrap_or_default();
        client = client.authenticate(username, password).await?;
    }

    let mut envelope = client.mail_from(from, Some(message.len())).await?;
    for recipient in recipients {
        envelope = envelope.rcpt_to(recipient).await?;
    }
    let client = envelope.send_data(message).await?;
    client.quit().await
}
