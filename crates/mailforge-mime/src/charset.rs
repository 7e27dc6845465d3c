//! Character sets used for text bodies.

use crate::encoding::TransferEncoding;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A character set a text body can be encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// 7-bit US-ASCII.
    UsAscii,
    /// ISO-8859-1 (Latin-1), a single-byte superset of ASCII.
    Latin1,
    /// UTF-8.
    Utf8,
}

impl Charset {
    /// Narrowest-first order tried when no charset is configured.
    pub const NEGOTIATION_ORDER: [Self; 3] = [Self::UsAscii, Self::Latin1, Self::Utf8];

    /// Returns the MIME name of the charset.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UsAscii => "us-ascii",
            Self::Latin1 => "iso-8859-1",
            Self::Utf8 => "utf-8",
        }
    }

    /// Returns the transfer encoding used for bodies in this charset.
    #[must_use]
    pub const fn transfer_encoding(self) -> TransferEncoding {
        match self {
            Self::UsAscii => TransferEncoding::SevenBit,
            Self::Latin1 => TransferEncoding::QuotedPrintable,
            Self::Utf8 => TransferEncoding::Base64,
        }
    }

    /// Encodes text, returning `None` if a character is not representable.
    #[must_use]
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            Self::UsAscii => text.is_ascii().then(|| text.as_bytes().to_vec()),
            Self::Latin1 => text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect(),
            Self::Utf8 => Some(text.as_bytes().to_vec()),
        }
    }

    /// Decodes bytes in this charset.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid for the charset.
    pub fn decode(self, data: &[u8]) -> Result<String> {
        match self {
            Self::UsAscii if !data.is_ascii() => Err(Error::InvalidEncoding(
                "Non-ASCII byte in us-ascii text".to_string(),
            )),
            Self::UsAscii | Self::Utf8 => Ok(String::from_utf8(data.to_vec())?),
            Self::Latin1 => Ok(data.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Encodes text and verifies that decoding reproduces it exactly.
    #[must_use]
    pub fn encode_exact(self, text: &str) -> Option<Vec<u8>> {
        self.encode(text)
            .filter(|bytes| self.decode(bytes).is_ok_and(|round| round == text))
    }

    /// Picks the first charset in [`Charset::NEGOTIATION_ORDER`] that
    /// represents `text` exactly.
    #[must_use]
    pub fn negotiate(text: &str) -> Option<(Self, Vec<u8>)> {
        Self::NEGOTIATION_ORDER
            .iter()
            .find_map(|&charset| charset.encode_exact(text).map(|bytes| (charset, bytes)))
    }
}

impl FromStr for Charset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "us-ascii" | "ascii" => Ok(Self::UsAscii),
            "iso-8859-1" | "latin-1" | "latin1" => Ok(Self::Latin1),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(Error::UnknownCharset(other.to_string())),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
