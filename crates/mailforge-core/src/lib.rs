//! # mailforge-core
//!
//! Template-driven email composition.
//!
//! This crate provides:
//! - **Settings** - structure, params, headers, attachments and encoding preferences
//! - **Templates** - a renderer contract with minijinja and verbatim adapters
//! - **Markup annotations** - headers, subject, attachments and settings declared inside HTML
//! - **CSS inlining** and HTML-to-text conversion
//! - **Structure compiler** - turns a declarative tree into a MIME part tree
//! - **Modifiers** - BCC, DKIM signing and PGP encryption applied before delivery
//! - **Delivery agents** - SMTP plus in-memory agents for tests
//! - **Testing assertions** for semantic comparison of messages
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use mailforge_core::{Manager, ParsingAgent, SingleProvider, SourceTemplate};
//!
//! let agent = ParsingAgent::new();
//! let template = SourceTemplate::new()
//!     .with_format("html", "<p>Hello {{ name }}</p>")
//!     .with_format("subject", "Greetings");
//! let manager = Manager::builder(SingleProvider::new(template))
//!     .agent(Arc::new(agent.clone()))
//!     .build();
//!
//! let mut message = manager.new_message("welcome").unwrap();
//! message.set_param("name", "Joe");
//! message.set_header("From", "noreply@example.com");
//! message.set_header("To", "joe@example.com");
//! message.send(None, None).unwrap();
//!
//! let mail = agent.last().unwrap();
//! assert_eq!(mail.subject.as_deref(), Some("Greetings"));
//! assert_eq!(mail.plain.as_deref(), Some("Hello Joe\n"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod address;
pub mod attachment;
pub mod clock;
pub mod compose;
pub mod config;
pub mod css;
pub mod delivery;
mod error;
pub mod manager;
pub mod markup;
pub mod message;
pub mod modifier;
pub mod params;
pub mod settings;
pub mod structure;
pub mod template;
pub mod testing;
pub mod text;

pub use attachment::{Attachment, AttachmentSpec};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SettingsFile;
pub use delivery::{
    DeliveryAgent, DeliveryError, ParsedMail, ParsingAgent, RecordingAgent, SentMail, SmtpAgent,
};
pub use error::{Error, Result};
pub use manager::{HeaderHook, Manager, ManagerBuilder};
pub use markup::MarkupError;
pub use message::Message;
pub use modifier::{
    AddRecipient, ChainModifier, DkimSigner, Encryptor, Envelope, GpgEncryptor, Modifier, Payload,
    PgpEncryptor,
};
pub use params::{Param, Params, RenderCache};
pub use settings::{Components, Settings};
pub use structure::{Component, ContainerKind, Structure};
pub use template::{
    DirectoryProvider, RenderError, Renderer, SingleProvider, SourceTemplate, TemplateAdapter,
    TemplateProvider,
};
pub use testing::EmailAssertions;

pub use mailforge_mime::{Charset, Headers, Part, TransferEncoding};
pub use mailforge_smtp::{Security, SmtpOptions};
