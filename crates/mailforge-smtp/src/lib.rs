//! # mailforge-smtp
//!
//! An async SMTP submission client implementing the parts of RFC 5321 a
//! message composer needs.
//!
//! ## Features
//!
//! - **Type-state sessions**: EHLO, STARTTLS, AUTH, MAIL, RCPT and DATA can
//!   only be issued in a valid order
//! - **TLS**: implicit TLS and STARTTLS over rustls with the webpki roots
//! - **Authentication**: PLAIN and LOGIN
//! - **Dot-stuffing** and CRLF normalization of message data
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailforge_smtp::{SmtpOptions, submit};
//!
//! # async fn run() -> mailforge_smtp::Result<()> {
//! let options = SmtpOptions {
//!     host: "smtp.example.com".into(),
//!     port: 587,
//!     security: mailforge_smtp::Security::StartTls,
//!     ..SmtpOptions::default()
//! };
//! submit(
//!     &options,
//!     "sender@example.com",
//!     &["recipient@example.com".to_string()],
//!     b"Subject: Test\n\nHello\n",
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod command;
mod error;
pub mod reply;
pub mod stream;
pub mod transport;

pub use client::{Client, Envelope, Greeted, Ready};
pub use command::{Address, Capabilities, Command};
pub use error::{Error, Result};
pub use reply::{Reply, ReplyCode};
pub use transport::{Security, SmtpOptions, submit};
