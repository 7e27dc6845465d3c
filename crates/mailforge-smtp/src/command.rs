//! SMTP commands and envelope addresses.

use crate::error::{Error, Result};
use std::fmt;

/// Envelope address used in `MAIL FROM` and `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates and wraps an envelope address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is empty, lacks a single `@` with
    /// non-empty sides, or contains characters that would break the command
    /// line.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        if addr.contains(['<', '>', '\r', '\n']) || addr.chars().any(char::is_whitespace) {
            return Err(Error::InvalidAddress(format!("{addr:?}")));
        }
        match addr.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                Ok(Self(addr))
            }
            _ => Err(Error::InvalidAddress(format!("{addr:?}"))),
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo(String),
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH PLAIN with the base64 initial response
    AuthPlain(String),
    /// AUTH LOGIN
    AuthLogin,
    /// A base64 line answering an AUTH challenge
    AuthResponse(String),
    /// MAIL FROM with optional SIZE
    MailFrom {
        /// Sender address
        from: Address,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO
    RcptTo(Address),
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to a CRLF-terminated line.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo(hostname) => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::AuthPlain(initial) => format!("AUTH PLAIN {initial}"),
            Self::AuthLogin => "AUTH LOGIN".to_string(),
            Self::AuthResponse(response) => response.clone(),
            Self::MailFrom { from, size: None } => format!("MAIL FROM:<{from}>"),
            Self::MailFrom {
                from,
                size: Some(size),
            } => format!("MAIL FROM:<{from}> SIZE={size}"),
            Self::RcptTo(to) => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the command as it may appear in logs, with credentials masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::AuthPlain(_) => "AUTH PLAIN ****".to_string(),
            Self::AuthResponse(_) => "****".to_string(),
            other => String::from_utf8_lossy(&other.serialize()).trim_end().to_string(),
        }
    }
}

/// Server capabilities advertised in the EHLO reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Server hostname from the first EHLO line.
    pub hostname: String,
    /// Upper-cased extension keywords.
    pub keywords: Vec<String>,
    /// Advertised SASL mechanisms.
    pub auth: Vec<String>,
    /// Advertised SIZE limit, if any.
    pub size: Option<usize>,
}

impl Capabilities {
    /// Builds capabilities from EHLO reply lines.
    #[must_use]
    pub fn from_ehlo(lines: &[String]) -> Self {
        let mut caps = Self {
            hostname: lines
                .first()
                .and_then(|l| l.split_whitespace().next())
                .unwrap_or_default()
                .to_string(),
            ..Self::default()
        };
        for line in lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next().map(str::to_ascii_uppercase) else {
                continue;
            };
            match keyword.as_str() {
                "AUTH" => caps.auth.extend(words.map(str::to_ascii_uppercase)),
                "SIZE" => caps.size = words.next().and_then(|s| s.parse().ok()).filter(|&s| s > 0),
                _ => {}
            }
            caps.keywords.push(keyword);
        }
        caps
    }

    /// Returns true if the keyword was advertised.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword))
    }

    /// Returns true if the SASL mechanism was advertised.
    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.auth.iter().any(|m| m.eq_ignore_ascii_case(mechanism))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(Address::new("user@example.com").is_ok());
        assert!(Address::new("").is_err());
        assert!(Address::new("user").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("a@b@c").is_err());
        assert!(Address::new("a b@c").is_err());
        assert!(Address::new("<a@b>").is_err());
    }

    #[test]
    fn test_serialize() {
        let from = Address::new("a@x.com").unwrap();
        assert_eq!(Command::Ehlo("client.local".into()).serialize(), b"EHLO client.local\r\n");
        assert_eq!(
            Command::MailFrom { from: from.clone(), size: None }.serialize(),
            b"MAIL FROM:<a@x.com>\r\n"
        );
        assert_eq!(
            Command::MailFrom { from, size: Some(42) }.serialize(),
            b"MAIL FROM:<a@x.com> SIZE=42\r\n"
        );
        assert_eq!(
            Command::RcptTo(Address::new("b@x.com").unwrap()).serialize(),
            b"RCPT TO:<b@x.com>\r\n"
        );
    }

    #[test]
    fn test_redacted() {
        assert_eq!(Command::AuthPlain("c2VjcmV0".into()).redacted(), "AUTH PLAIN ****");
        assert_eq!(Command::Data.redacted(), "DATA");
    }

    #[test]
    fn test_capabilities() {
        let lines: Vec<String> = ["mx.example.com greets you", "STARTTLS", "auth plain LOGIN", "SIZE 1000", "8BITMIME"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let caps = Capabilities::from_ehlo(&lines);
        assert_eq!(caps.hostname, "mx.example.com");
        assert!(caps.supports("starttls"));
        assert!(caps.supports("8BITMIME"));
        assert!(caps.supports_auth("plain"));
        assert!(caps.supports_auth("LOGIN"));
        assert_eq!(caps.size, Some(1000));
    }
}
