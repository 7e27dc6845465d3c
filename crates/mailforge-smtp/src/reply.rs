//! SMTP replies and their parser.

use crate::error::{Error, Result};
use std::fmt;

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested action okay
    pub const OK: Self = Self(250);
    /// 334 Server challenge during AUTH
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);

    /// Creates a reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true for 2xx codes.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply text, one entry per line.
    pub lines: Vec<String>,
}

impl Reply {
    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the reply text as a single string.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Fails unless the reply carries `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] with the server's code and text.
    pub fn expect_code(self, expected: ReplyCode) -> Result<Self> {
        if self.code == expected {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// Fails unless the reply is 2xx.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] with the server's code and text.
    pub fn expect_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    fn into_error(self) -> Error {
        Error::Rejected {
            code: self.code.as_u16(),
            message: self.text(),
        }
    }

    /// Parses a reply from its lines (without line terminators).
    ///
    /// Replies are single-line (`250 OK`) or multi-line, where every line but
    /// the last uses `-` after the code (`250-first`, `250 last`).
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the lines are malformed or the codes of a
    /// multi-line reply disagree.
    pub fn parse(lines: &[String]) -> Result<Self> {
        let first = lines
            .first()
            .ok_or_else(|| Error::Protocol("Empty reply".into()))?;
        let code = parse_code(first)?;

        let mut text = Vec::with_capacity(lines.len());
        for line in lines {
            if parse_code(line)? != code {
                return Err(Error::Protocol(format!("Mixed reply codes in {line:?}")));
            }
            match line.len() {
                3 => text.push(String::new()),
                len if len > 3 && matches!(line.as_bytes()[3], b' ' | b'-') => {
                    text.push(line[4..].to_string());
                }
                _ => return Err(Error::Protocol(format!("Malformed reply line: {line}"))),
            }
        }

        Ok(Self { code, lines: text })
    }
}

fn parse_code(line: &str) -> Result<ReplyCode> {
    line.get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u16>().ok())
        .map(ReplyCode::new)
        .ok_or_else(|| Error::Protocol(format!("Invalid reply code in {line:?}")))
}

/// Checks if a line ends a (possibly multi-line) reply.
#[must_use]
pub fn is_last_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_single_line() {
        let reply = Reply::parse(&lines(&["220 mx.example.com ESMTP ready"])).unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
        assert_eq!(reply.text(), "mx.example.com ESMTP ready");
    }

    #[test]
    fn test_parse_multi_line() {
        let reply =
            Reply::parse(&lines(&["250-mx.example.com", "250-STARTTLS", "250 AUTH PLAIN LOGIN"]))
                .unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.lines, vec!["mx.example.com", "STARTTLS", "AUTH PLAIN LOGIN"]);
    }

    #[test]
    fn test_bare_code() {
        let reply = Reply::parse(&lines(&["250"])).unwrap();
        assert_eq!(reply.lines, vec![""]);
        assert!(is_last_line("250"));
    }

    #[test]
    fn test_malformed() {
        assert!(Reply::parse(&[]).is_err());
        assert!(Reply::parse(&lines(&["25"])).is_err());
        assert!(Reply::parse(&lines(&["ABC OK"])).is_err());
        assert!(Reply::parse(&lines(&["250-a", "251 b"])).is_err());
        assert!(Reply::parse(&lines(&["250xOK"])).is_err());
    }

    #[test]
    fn test_last_line() {
        assert!(is_last_line("250 OK"));
        assert!(!is_last_line("250-more"));
    }

    #[test]
    fn test_expect() {
        let reply = Reply::parse(&lines(&["550 no such user"])).unwrap();
        let err = reply.expect_success().unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.to_string(), "SMTP error 550: no such user");
    }
}
