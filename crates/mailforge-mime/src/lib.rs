//! # mailforge-mime
//!
//! MIME building blocks for composed email.
//!
//! ## Features
//!
//! - **Part trees**: leaf and multipart parts that serialize to wire form
//!   and parse back
//! - **Headers**: ordered, case-insensitive header maps with wire-name
//!   formatting (`Message-ID`, `MIME-Version`, `CC`)
//! - **Encodings**: Base64, Quoted-Printable, RFC 2047 header words
//! - **Charsets**: narrowest-first negotiation between us-ascii,
//!   iso-8859-1 and utf-8
//! - **Canonical forms**: boundary-free header, structure, and content
//!   comparison for tests
//!
//! ## Quick Start
//!
//! ```
//! use mailforge_mime::{Charset, ContentType, Part};
//!
//! let (charset, bytes) = Charset::negotiate("Hello").unwrap();
//! let text = Part::leaf(
//!     &ContentType::text("plain", charset.name()),
//!     charset.transfer_encoding(),
//!     &bytes,
//! );
//! let root = Part::multipart(&ContentType::multipart("mixed", "b-1"), vec![text]).unwrap();
//!
//! let wire = root.to_bytes();
//! let parsed = Part::parse(&wire).unwrap();
//! assert_eq!(
//!     mailforge_mime::canonical::canonical_structure(&parsed),
//!     "multipart/mixed\n`-- text/plain\n"
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod canonical;
pub mod charset;
pub mod content_type;
pub mod encoding;
pub mod error;
pub mod header;
pub mod part;

pub use charset::Charset;
pub use content_type::ContentType;
pub use encoding::TransferEncoding;
pub use error::{Error, Result};
pub use header::{Headers, format_name};
pub use part::{Body, Part};
