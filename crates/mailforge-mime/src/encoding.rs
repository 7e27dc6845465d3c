//! Transfer encodings and RFC 2047 header words.
//!
//! Bodies are encoded with `\n` line endings; the transport is responsible
//! for converting to CRLF on the wire.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::fmt::Write as _;

/// Maximum encoded line length for base64 and quoted-printable bodies.
const MAX_LINE_LENGTH: usize = 76;

/// Content-Transfer-Encoding of a leaf part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses a transfer encoding name.
    ///
    /// # Errors
    ///
    /// Returns an error for names outside RFC 2045.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "7bit" => Ok(Self::SevenBit),
            "8bit" => Ok(Self::EightBit),
            "base64" => Ok(Self::Base64),
            "quoted-printable" => Ok(Self::QuotedPrintable),
            "binary" => Ok(Self::Binary),
            other => Err(Error::InvalidEncoding(format!(
                "Unknown transfer encoding: {other}"
            ))),
        }
    }

    /// Encodes raw content for this transfer encoding.
    #[must_use]
    pub fn encode(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::SevenBit | Self::EightBit | Self::Binary => data.to_vec(),
            Self::Base64 => encode_base64_lines(data).into_bytes(),
            Self::QuotedPrintable => encode_quoted_printable(data).into_bytes(),
        }
    }

    /// Decodes a body previously produced by [`TransferEncoding::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid for this encoding.
    pub fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(data.to_vec()),
            Self::Base64 => {
                let compact: Vec<u8> = data
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                Ok(STANDARD.decode(compact)?)
            }
            Self::QuotedPrintable => decode_quoted_printable(data),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Encodes data as a single line of Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data, ignoring embedded whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    TransferEncoding::Base64.decode(data.as_bytes())
}

/// Encodes data as Base64 wrapped at 76 columns, ending with a newline.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH + 1);
    for chunk in encoded.as_bytes().chunks(MAX_LINE_LENGTH) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out
}

/// Encodes bytes using Quoted-Printable (RFC 2045).
///
/// Line breaks in the input stay hard line breaks; long lines get soft
/// breaks so no encoded line exceeds 76 characters.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len());
    let mut lines = data.split(|&b| b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let mut width = 0;
        for (i, &byte) in line.iter().enumerate() {
            let last = i + 1 == line.len();
            let token = match byte {
                b'!'..=b'<' | b'>'..=b'~' => (byte as char).to_string(),
                b' ' | b'\t' if !last => (byte as char).to_string(),
                _ => format!("={byte:02X}"),
            };
            if width + token.len() > MAX_LINE_LENGTH - 1 {
                result.push_str("=\n");
                width = 0;
            }
            width += token.len();
            result.push_str(&token);
        }
        if lines.peek().is_some() {
            result.push('\n');
        }
    }

    result
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        if data[i] != b'=' {
            result.push(data[i]);
            i += 1;
            continue;
        }

        match data.get(i + 1..) {
            Some([b'\n', ..]) => i += 2,
            Some([b'\r', b'\n', ..]) => i += 3,
            Some([hi, lo, ..]) => {
                let hex = [*hi, *lo];
                let byte = std::str::from_utf8(&hex)
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        Error::InvalidEncoding(format!(
                            "Invalid escape ={}",
                            String::from_utf8_lossy(&hex)
                        ))
                    })?;
                result.push(byte);
                i += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

/// UTF-8 bytes carried by one encoded-word: 48 base64 characters, 60 with
/// delimiters, which leaves room for the header name on the first line.
const ENCODED_WORD_PAYLOAD: usize = 36;

/// Encodes the non-ASCII words of a header value as RFC 2047 encoded-words.
///
/// Runs of adjacent non-ASCII words are encoded together as one phrase,
/// split over as many encoded-words as needed. ASCII words, such as the
/// `<addr>` of a mailbox, are left as they are.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    let mut words: Vec<String> = Vec::new();
    let mut phrase: Vec<&str> = Vec::new();
    for word in text.split(' ') {
        if !word.is_ascii() || (word.is_empty() && !phrase.is_empty()) {
            phrase.push(word);
            continue;
        }
        if !phrase.is_empty() {
            words.extend(encoded_words(&phrase.join(" ")));
            phrase.clear();
        }
        words.push(word.to_string());
    }
    if !phrase.is_empty() {
        words.extend(encoded_words(&phrase.join(" ")));
    }
    words.join(" ")
}

/// Splits `phrase` at character boundaries into base64 encoded-words.
fn encoded_words(phrase: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (index, ch) in phrase.char_indices() {
        let next = index + ch.len_utf8();
        if next - start > ENCODED_WORD_PAYLOAD {
            words.push(encoded_word(&phrase[start..end]));
            start = end;
        }
        end = next;
    }
    if start < phrase.len() {
        words.push(encoded_word(&phrase[start..]));
    }
    words
}

fn encoded_word(text: &str) -> String {
    let mut out = String::new();
    let _ = write!(out, "=?utf-8?B?{}?=", encode_base64(text.as_bytes()));
    out
}

/// Decodes every RFC 2047 encoded-word in a header value.
///
/// Whitespace between two adjacent encoded-words is dropped. Only UTF-8
/// and ASCII-compatible payloads are supported; unknown words are left
/// untouched.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let gap = &rest[..start];
        let word = &rest[start + 2..];
        if let Some((decoded, consumed)) = decode_encoded_word(word) {
            if !(after_word && gap.trim().is_empty()) {
                out.push_str(gap);
            }
            out.push_str(&decoded);
            rest = &word[consumed..];
            after_word = true;
        } else {
            out.push_str(gap);
            out.push_str("=?");
            rest = word;
            after_word = false;
        }
    }
    out.push_str(rest);
    out
}

/// Decodes `charset?scheme?payload?=`, returning the text and the number of
/// bytes consumed.
fn decode_encoded_word(word: &str) -> Option<(String, usize)> {
    let charset_end = word.find('?')?;
    let scheme = word.get(charset_end + 1..charset_end + 2)?;
    if word.get(charset_end + 2..charset_end + 3)? != "?" {
        return None;
    }
    let payload_start = charset_end + 3;
    let payload_len = word[payload_start..].find("?=")?;
    let payload = &word[payload_start..payload_start + payload_len];
    let bytes = match scheme {
        "B" | "b" => decode_base64(payload).ok()?,
        "Q" | "q" => decode_quoted_printable(payload.replace('_', " ").as_bytes()).ok()?,
        _ => return None,
    };
    Some((
        String::from_utf8_lossy(&bytes).into_owned(),
        payload_start + payload_len + 2,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_lines_are_wrapped() {
        let data = vec![b'x'; 120];
        let encoded = encode_base64_lines(&data);
        assert!(encoded.lines().all(|l| l.len() <= MAX_LINE_LENGTH));
        assert!(encoded.ends_with('\n'));
        assert_eq!(TransferEncoding::Base64.decode(encoded.as_bytes()).unwrap(), data);
    }

    #[test]
    fn test_quoted_printable_latin1() {
        // "Café" in iso-8859-1
        assert_eq!(encode_quoted_printable(b"Caf\xe9"), "Caf=E9");
        assert_eq!(decode_quoted_printable(b"Caf=E9").unwrap(), b"Caf\xe9");
    }

    #[test]
    fn test_quoted_printable_keeps_line_breaks() {
        assert_eq!(encode_quoted_printable(b"a = b\nnext \n"), "a =3D b\nnext=20\n");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let line = vec![b'a'; 200];
        let encoded = encode_quoted_printable(&line);
        assert!(encoded.lines().all(|l| l.len() <= MAX_LINE_LENGTH));
        assert_eq!(decode_quoted_printable(encoded.as_bytes()).unwrap(), line);
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(decode_quoted_printable(b"bad =ZZ").is_err());
        assert!(decode_quoted_printable(b"cut =4").is_err());
    }

    #[test]
    fn test_rfc2047() {
        assert_eq!(encode_rfc2047("plain"), "plain");
        let encoded = encode_rfc2047("Grüße");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert_eq!(decode_rfc2047(&format!("Re: {encoded}!")), "Re: Grüße!");
        assert_eq!(decode_rfc2047("=?utf-8?Q?a_b=3Dc?="), "a b=c");
        assert_eq!(decode_rfc2047("=?utf-8?Q?=3D?="), "=");
        assert_eq!(decode_rfc2047("odd =? marker"), "odd =? marker");
        assert_eq!(decode_rfc2047("=?utf-8?Q?a?=  =?utf-8?Q?b?= c"), "ab c");
    }

    #[test]
    fn test_rfc2047_keeps_ascii_words() {
        let encoded = encode_rfc2047("Jörg Müller <jorg@example.com>");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?= <jorg@example.com>"));
        assert_eq!(encoded.matches("=?utf-8?B?").count(), 1);
        assert_eq!(decode_rfc2047(&encoded), "Jörg Müller <jorg@example.com>");

        let encoded = encode_rfc2047("Re: café  crème");
        assert!(encoded.starts_with("Re: =?utf-8?B?"));
        assert_eq!(decode_rfc2047(&encoded), "Re: café  crème");
    }

    #[test]
    fn test_rfc2047_splits_long_phrases() {
        let text = "é".repeat(600);
        let encoded = encode_rfc2047(&text);
        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.len() <= 75 && w.starts_with("=?utf-8?B?")));
        assert_eq!(decode_rfc2047(&encoded), text);
    }

    #[test]
    fn test_transfer_encoding_names() {
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable").unwrap(),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::SevenBit.to_string(), "7bit");
        assert!(TransferEncoding::parse("uuencode").is_err());
    }

    proptest! {
        #[test]
        fn quoted_printable_lines_stay_short(data in proptest::collection::vec(any::<u8>(), 0..400)) {
            let encoded = encode_quoted_printable(&data);
            prop_assert!(encoded.lines().all(|l| l.len() <= MAX_LINE_LENGTH));
            prop_assert!(encoded.is_ascii());
        }
    }
}
