//! PGP/MIME encryption (RFC 3156).

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use mailforge_mime::{ContentType, Headers, Part, TransferEncoding};
use uuid::Uuid;

use super::{Envelope, Modifier, Payload};
use crate::error::{Error, Result};

/// Headers of the original message not carried over to the encrypted
/// wrapper.
const REPLACED_HEADERS: [&str; 3] = ["content-type", "mime-version", "content-transfer-encoding"];

/// Public-key encryption backend.
pub trait Encryptor: Send + Sync + fmt::Debug {
    /// Returns the addresses among `candidates` that have a known key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encryption`] if the keyring cannot be read.
    fn known_recipients(&self, candidates: &[String]) -> Result<Vec<String>>;

    /// Encrypts `data` to every key in `recipients`, optionally signing
    /// with `sign`, and returns ASCII-armored ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encryption`] if the backend reports failure.
    fn encrypt(&self, data: &[u8], recipients: &[String], sign: Option<&str>) -> Result<Vec<u8>>;
}

/// Encrypts by running the `gpg` binary.
#[derive(Debug, Clone)]
pub struct GpgEncryptor {
    program: PathBuf,
    home: Option<PathBuf>,
}

impl Default for GpgEncryptor {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gpg"),
            home: None,
        }
    }
}

impl GpgEncryptor {
    /// Uses `gpg` from `PATH` and the default keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses another executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Uses the keyring in `home` (`--homedir`).
    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("--batch").arg("--no-tty");
        if let Some(home) = &self.home {
            command.arg("--homedir").arg(home);
        }
        command
    }
}

impl Encryptor for GpgEncryptor {
    fn known_recipients(&self, candidates: &[String]) -> Result<Vec<String>> {
        let output = self
            .command()
            .args(["--with-colons", "--list-keys"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Encryption(format!("cannot run {}: {e}", self.program.display())))?;
        if !output.status.success() {
            return Err(Error::Encryption(format!(
                "listing keys failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let listing = String::from_utf8_lossy(&output.stdout);
        let uids: Vec<&str> = listing
            .lines()
            .filter(|line| line.starts_with("uid:"))
            .filter_map(|line| line.split(':').nth(9))
            .collect();
        Ok(candidates
            .iter()
            .filter(|c| uids.iter().any(|uid| uid.contains(c.as_str())))
            .cloned()
            .collect())
    }

    fn encrypt(&self, data: &[u8], recipients: &[String], sign: Option<&str>) -> Result<Vec<u8>> {
        let mut command = self.command();
        command.args(["--armor", "--trust-model", "always", "--encrypt"]);
        for recipient in recipients {
            command.arg("--recipient").arg(recipient);
        }
        if let Some(key) = sign {
            command.arg("--sign").arg("--local-user").arg(key);
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Encryption(format!("cannot run {}: {e}", self.program.display())))?;

        let stdin = child.stdin.take();
        let input = data.to_vec();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input)?;
            }
            Ok(())
        });
        let output = child
            .wait_with_output()
            .map_err(|e| Error::Encryption(e.to_string()))?;
        writer
            .join()
            .map_err(|_| Error::Encryption("writer thread panicked".to_string()))?
            .map_err(|e| Error::Encryption(format!("writing to gpg: {e}")))?;

        if !output.status.success() {
            return Err(Error::Encryption(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(output.stdout)
    }
}

/// Encrypts each message to its recipients and wraps the ciphertext in a
/// `multipart/encrypted` container.
#[derive(Debug, Clone)]
pub struct PgpEncryptor {
    encryptor: Arc<dyn Encryptor>,
    prune_keys: bool,
    prune_recipients: bool,
    sign: Option<String>,
    add_sign_key: bool,
    add_keys: Vec<String>,
}

impl PgpEncryptor {
    /// Creates a modifier using `encryptor`.
    ///
    /// Recipients without a known key are dropped from the encryption key
    /// set but still receive the message.
    pub fn new(encryptor: impl Encryptor + 'static) -> Self {
        Self {
            encryptor: Arc::new(encryptor),
            prune_keys: true,
            prune_recipients: false,
            sign: None,
            add_sign_key: true,
            add_keys: Vec::new(),
        }
    }

    /// Whether recipients without a known key are dropped from the key set.
    #[must_use]
    pub const fn prune_keys(mut self, prune: bool) -> Self {
        self.prune_keys = prune;
        self
    }

    /// Whether recipients without a known key are also dropped from the
    /// envelope and the `To` header.
    #[must_use]
    pub const fn prune_recipients(mut self, prune: bool) -> Self {
        self.prune_recipients = prune;
        self
    }

    /// Signs with `key`. Unless disabled with [`Self::add_sign_key`], the
    /// message is also encrypted to that key.
    #[must_use]
    pub fn sign_with(mut self, key: impl Into<String>) -> Self {
        self.sign = Some(key.into());
        self
    }

    /// Whether the signing key is added to the key set.
    #[must_use]
    pub const fn add_sign_key(mut self, add: bool) -> Self {
        self.add_sign_key = add;
        self
    }

    /// Always encrypts to `key` as well.
    #[must_use]
    pub fn add_key(mut self, key: impl Into<String>) -> Self {
        self.add_keys.push(key.into());
        self
    }

    fn key_set(&self, recipients: &[String]) -> Vec<String> {
        let extra = self
            .add_keys
            .iter()
            .chain(self.sign.iter().filter(|_| self.add_sign_key));
        let mut keys: Vec<String> = Vec::new();
        for key in recipients.iter().chain(extra) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

impl Modifier for PgpEncryptor {
    fn modify(&self, envelope: Envelope) -> Result<Envelope> {
        let Envelope {
            mail_from,
            mut recipients,
            payload,
        } = envelope;

        let mut keyed: Vec<String> = Vec::new();
        for recipient in &recipients {
            if !keyed.contains(recipient) {
                keyed.push(recipient.clone());
            }
        }
        if self.prune_keys {
            let known = self.encryptor.known_recipients(&keyed)?;
            keyed.retain(|recipient| {
                let found = known.contains(recipient);
                if !found {
                    tracing::warn!(recipient = %recipient, "recipient removed (no public key)");
                }
                found
            });
        }

        let mut part = payload.into_part()?;
        if self.prune_recipients {
            recipients.clone_from(&keyed);
            if part.headers.contains("to") {
                part.headers.set("To", keyed.join(", "));
            }
        }

        let mut plaintext = part.to_bytes();
        if !plaintext.ends_with(b"\n") {
            plaintext.push(b'\n');
        }
        let ciphertext = self
            .encryptor
            .encrypt(&plaintext, &self.key_set(&keyed), self.sign.as_deref())?;
        tracing::debug!(keys = keyed.len(), bytes = ciphertext.len(), "encrypted message");

        Ok(Envelope {
            mail_from,
            recipients,
            payload: Payload::Mime(wrap(&part.headers, &ciphertext)?),
        })
    }
}

fn wrap(original: &Headers, ciphertext: &[u8]) -> Result<Part> {
    let content_type = ContentType::multipart("encrypted", format!("=_{}", Uuid::new_v4().simple()))
        .with_parameter("protocol", "application/pgp-encrypted");
    let control = Part::leaf(
        &ContentType::new("application", "pgp-encrypted"),
        TransferEncoding::SevenBit,
        b"Version: 1\n",
    );
    let data = Part::leaf(
        &ContentType::new("application", "octet-stream"),
        TransferEncoding::SevenBit,
        ciphertext,
    );
    let mut wrapper = Part::multipart(&content_type, vec![control, data])?;
    wrapper.headers.set_default_first("MIME-Version", "1.0");
    for (name, value) in original.iter() {
        if !REPLACED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            wrapper.headers.add(name, value);
        }
    }
    Ok(wrapper)
}
