//! DKIM signing (RFC 6376), `rsa-sha256` with `relaxed/simple`
//! canonicalization.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::{Digest, Sha256};

use super::{Envelope, Modifier, Payload};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};

/// Headers signed when present, in this order.
pub const DEFAULT_SIGNED_HEADERS: [&str; 8] = [
    "From",
    "To",
    "Cc",
    "Subject",
    "Date",
    "Message-ID",
    "MIME-Version",
    "Content-Type",
];

const SIGNATURE_HEADER: &str = "DKIM-Signature";
const FOLD_WIDTH: usize = 72;

/// Prepends a `DKIM-Signature` header to each message.
///
/// The message is serialized first, so later modifiers see raw bytes.
#[derive(Clone)]
pub struct DkimSigner {
    key: SigningKey<Sha256>,
    domain: String,
    selector: String,
    identity: Option<String>,
    headers: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for DkimSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimSigner")
            .field("domain", &self.domain)
            .field("selector", &self.selector)
            .field("identity", &self.identity)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl DkimSigner {
    /// Creates a signer from a PEM private key (PKCS#1 or PKCS#8).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the key cannot be read.
    pub fn from_pem(pem: &str, domain: impl Into<String>, selector: impl Into<String>) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| Error::Signing(format!("invalid private key: {e}")))?;
        Ok(Self::new(key, domain, selector))
    }

    /// Creates a signer from a loaded key.
    pub fn new(key: RsaPrivateKey, domain: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            key: SigningKey::new(key),
            domain: domain.into(),
            selector: selector.into(),
            identity: None,
            headers: DEFAULT_SIGNED_HEADERS.iter().map(ToString::to_string).collect(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the signing identity (`i=`). Defaults to `@<domain>`.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Replaces the list of headers to sign.
    #[must_use]
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the clock used for the `t=` tag.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Computes the signature header line for `message`, without line
    /// terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the RSA operation fails.
    pub fn signature_header(&self, message: &[u8]) -> Result<String> {
        let (value, input) = self.signing_input(message, self.clock.now().timestamp());
        let signature = self
            .key
            .try_sign(&input)
            .map_err(|e| Error::Signing(e.to_string()))?;
        let encoded = STANDARD.encode(signature.to_bytes());
        tracing::debug!(domain = %self.domain, selector = %self.selector, "signed message");
        Ok(format!("{SIGNATURE_HEADER}: {value}{}", fold(&encoded)))
    }

    /// Returns the signature header value with an empty `b=` tag and the
    /// bytes the signature covers.
    fn signing_input(&self, message: &[u8], timestamp: i64) -> (String, Vec<u8>) {
        let (headers, body) = split(message);
        let body_hash = STANDARD.encode(Sha256::digest(canonical_body(&body)));

        let mut signed = Vec::new();
        let mut input = Vec::new();
        for name in &self.headers {
            if let Some((raw_name, raw_value)) = headers
                .iter()
                .rev()
                .find(|(n, _)| n.trim().eq_ignore_ascii_case(name))
            {
                input.extend_from_slice(relaxed_header(raw_name, raw_value).as_bytes());
                input.extend_from_slice(b"\r\n");
                signed.push(name.as_str());
            }
        }

        let identity = self
            .identity
            .clone()
            .unwrap_or_else(|| format!("@{}", self.domain));
        let value = format!(
            "v=1; a=rsa-sha256; c=relaxed/simple; d={}; i={identity}; s={}; t={timestamp}; h={}; bh={body_hash}; b=",
            self.domain,
            self.selector,
            signed.join(":"),
        );
        input.extend_from_slice(relaxed_header(SIGNATURE_HEADER, &value).as_bytes());
        (value, input)
    }
}

impl Modifier for DkimSigner {
    fn modify(&self, envelope: Envelope) -> Result<Envelope> {
        let message = envelope.payload.into_bytes();
        let header = self.signature_header(&message)?;
        let mut signed = Vec::with_capacity(header.len() + 1 + message.len());
        signed.extend_from_slice(header.as_bytes());
        signed.push(b'\n');
        signed.extend_from_slice(&message);
        Ok(Envelope {
            payload: Payload::Raw(signed),
            ..envelope
        })
    }
}

/// Splits a message into raw headers (name, value with folding kept) and
/// body lines.
fn split(message: &[u8]) -> (Vec<(String, String)>, Vec<&[u8]>) {
    let mut lines: Vec<&[u8]> = message
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();
    if message.ends_with(b"\n") {
        lines.pop();
    }

    let separator = lines.iter().position(|line| line.is_empty());
    let (head, body) = match separator {
        Some(index) => (&lines[..index], lines[index + 1..].to_vec()),
        None => (&lines[..], Vec::new()),
    };

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head {
        let line = String::from_utf8_lossy(line);
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push_str("\r\n");
                value.push_str(&line);
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push((name.to_string(), value.to_string()));
        }
    }
    (headers, body)
}

/// `simple` body canonicalization: CRLF line endings, trailing empty lines
/// removed, exactly one final CRLF.
fn canonical_body(lines: &[&[u8]]) -> Vec<u8> {
    let end = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(0, |index| index + 1);
    let mut out = Vec::new();
    for line in &lines[..end] {
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    if out.is_empty() {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// `relaxed` header canonicalization, without the trailing CRLF.
fn relaxed_header(name: &str, value: &str) -> String {
    let unfolded = value.replace("\r\n", "");
    let collapsed = unfolded.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{}:{collapsed}", name.trim().to_ascii_lowercase())
}

fn fold(value: &str) -> String {
    value
        .as_bytes()
        .chunks(FOLD_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\n ")
}
