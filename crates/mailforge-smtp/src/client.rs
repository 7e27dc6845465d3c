//! Type-state SMTP client.
//!
//! ```text
//! Greeted ── ehlo() ──→ Ready ── mail_from() ──→ Envelope ── send_data() ──→ Ready
//!                        │  ↑                       │
//!                        └──┘ starttls(), auth_*()   └── rcpt_to(), reset()
//! ```

use crate::command::{Address, Capabilities, Command};
use crate::error::{Error, Result};
use crate::reply::{Reply, ReplyCode, is_last_line};
use crate::stream::SmtpStream;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::marker::PhantomData;

/// Type-state marker: greeting received, EHLO not yet sent.
#[derive(Debug)]
pub struct Greeted;

/// Type-state marker: EHLO accepted, no transaction open.
#[derive(Debug)]
pub struct Ready;

/// Type-state marker: MAIL FROM accepted.
#[derive(Debug)]
pub struct Envelope;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    capabilities: Capabilities,
    recipients: usize,
    _state: PhantomData<State>,
}

impl<S> Client<S> {
    /// Returns what the server advertised in its last EHLO reply.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            capabilities: self.capabilities,
            recipients: self.recipients,
            _state: PhantomData,
        }
    }

    async fn command(&mut self, command: Command) -> Result<Reply> {
        tracing::debug!(command = %command.redacted(), "SMTP >");
        self.stream.write_all(&command.serialize()).await?;
        read_reply(&mut self.stream).await
    }

    /// Sends QUIT and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.command(Command::Quit).await?;
        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::Rejected {
                code: reply.code.as_u16(),
                message: reply.text(),
            });
        }
        Ok(())
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }
        let last = is_last_line(&line);
        lines.push(line);
        if last {
            break;
        }
    }
    let reply = Reply::parse(&lines)?;
    tracing::debug!(code = %reply.code, "SMTP <");
    Ok(reply)
}

impl Client<Greeted> {
    /// Reads the server greeting from a freshly opened stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or is not 220.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        read_reply(&mut stream)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;
        Ok(Self {
            stream,
            capabilities: Capabilities::default(),
            recipients: 0,
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects EHLO.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Client<Ready>> {
        let reply = self
            .command(Command::Ehlo(client_hostname.to_string()))
            .await?
            .expect_success()?;
        self.capabilities = Capabilities::from_ehlo(&reply.lines);
        Ok(self.transition())
    }
}

impl Client<Ready> {
    /// Upgrades the connection with STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised, rejected, or the
    /// handshake fails.
    pub async fn starttls(mut self, server_hostname: &str, client_hostname: &str) -> Result<Self> {
        if !self.capabilities.supports("STARTTLS") {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        self.command(Command::StartTls)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;
        self.stream = self.stream.upgrade_to_tls(server_hostname).await?;

        let reply = self
            .command(Command::Ehlo(client_hostname.to_string()))
            .await?
            .expect_success()?;
        self.capabilities = Capabilities::from_ehlo(&reply.lines);
        Ok(self)
    }

    /// Authenticates with the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the credentials.
    pub async fn auth_plain(mut self, username: &str, password: &str) -> Result<Self> {
        let initial = STANDARD.encode(format!("\0{username}\0{password}"));
        self.command(Command::AuthPlain(initial))
            .await?
            .expect_code(ReplyCode::AUTH_SUCCESS)?;
        Ok(self)
    }

    /// Authenticates with the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects either step.
    pub async fn auth_login(mut self, username: &str, password: &str) -> Result<Self> {
        self.command(Command::AuthLogin)
            .await?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;
        self.command(Command::AuthResponse(STANDARD.encode(username)))
            .await?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;
        self.command(Command::AuthResponse(STANDARD.encode(password)))
            .await?
            .expect_code(ReplyCode::AUTH_SUCCESS)?;
        Ok(self)
    }

    /// Authenticates with the best advertised mechanism (PLAIN, then LOGIN).
    ///
    /// # Errors
    ///
    /// Returns an error if neither mechanism is advertised or login fails.
    pub async fn authenticate(self, username: &str, password: &str) -> Result<Self> {
        if self.capabilities.supports_auth("PLAIN") {
            self.auth_plain(username, password).await
        } else if self.capabilities.supports_auth("LOGIN") {
            self.auth_login(username, password).await
        } else {
            Err(Error::NotSupported("AUTH PLAIN or LOGIN".into()))
        }
    }

    /// Opens a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the sender.
    pub async fn mail_from(mut self, from: Address, size: Option<usize>) -> Result<Client<Envelope>> {
        let size = size.filter(|_| self.capabilities.supports("SIZE"));
        self.command(Command::MailFrom { from, size })
            .await?
            .expect_success()?;
        self.recipients = 0;
        Ok(self.transition())
    }
}

impl Client<Envelope> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the recipient.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.command(Command::RcptTo(to)).await?.expect_success()?;
        self.recipients += 1;
        Ok(self)
    }

    /// Abandons the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if RSET fails.
    pub async fn reset(mut self) -> Result<Client<Ready>> {
        self.command(Command::Rset).await?.expect_success()?;
        Ok(self.transition())
    }

    /// Sends DATA, the message, and the terminating dot.
    ///
    /// Line endings are normalized to CRLF and lines starting with `.` are
    /// dot-stuffed.
    ///
    /// # Errors
    ///
    /// Returns an error if no recipient was accepted or the server rejects
    /// the message.
    pub async fn send_data(mut self, message: &[u8]) -> Result<Client<Ready>> {
        if self.recipients == 0 {
            return Err(Error::NoRecipients);
        }
        self.command(Command::Data)
            .await?
            .expect_code(ReplyCode::START_DATA)?;

        self.stream.write_all(&encode_data(message)).await?;
        read_reply(&mut self.stream).await?.expect_success()?;
        Ok(self.transition())
    }
}

/// Encodes a message for the DATA phase, including the final `.` line.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::BufReader;
    use tokio_test::io::Builder;

    fn mock(builder: &mut Builder) -> SmtpStream {
        SmtpStream::Mock(BufReader::new(builder.build()))
    }

    #[test]
    fn test_encode_data() {
        assert_eq!(encode_data(b"A: b\n\n.hidden\nend\n"), b"A: b\r\n\r\n..hidden\r\nend\r\n.\r\n");
        assert_eq!(encode_data(b"crlf\r\n"), b"crlf\r\n.\r\n");
        assert_eq!(encode_data(b""), b".\r\n");
    }

    #[tokio::test]
    async fn test_full_session_with_auth_plain() {
        let stream = mock(
            Builder::new()
                .read(b"220 mx.example.com ESMTP\r\n")
                .write(b"EHLO client.local\r\n")
                .read(b"250-mx.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 SIZE 1000\r\n")
                .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
                .read(b"235 2.7.0 Authentication successful\r\n")
                .write(b"MAIL FROM:<a@x.com> SIZE=12\r\n")
                .read(b"250 OK\r\n")
                .write(b"RCPT TO:<b@x.com>\r\n")
                .read(b"250 OK\r\n")
                .write(b"DATA\r\n")
                .read(b"354 go ahead\r\n")
                .write(b"Subject: hi\r\n\r\nbody\r\n.\r\n")
                .read(b"250 queued\r\n")
                .write(b"QUIT\r\n")
                .read(b"221 bye\r\n"),
        );

        let client = Client::from_stream(stream).await.unwrap();
        let client = client.ehlo("client.local").await.unwrap();
        assert_eq!(client.capabilities().size, Some(1000));
        let client = client.authenticate("user", "pass").await.unwrap();
        let client = client
            .mail_from(Address::new("a@x.com").unwrap(), Some(12))
            .await
            .unwrap();
        let client = client.rcpt_to(Address::new("b@x.com").unwrap()).await.unwrap();
        let client = client.send_data(b"Subject: hi\n\nbody\n").await.unwrap();
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_login_fallback() {
        let stream = mock(
            Builder::new()
                .read(b"220 ready\r\n")
                .write(b"EHLO c\r\n")
                .read(b"250-s\r\n250 AUTH LOGIN\r\n")
                .write(b"AUTH LOGIN\r\n")
                .read(b"334 VXNlcm5hbWU6\r\n")
                .write(b"dXNlcg==\r\n")
                .read(b"334 UGFzc3dvcmQ6\r\n")
                .write(b"cGFzcw==\r\n")
                .read(b"235 ok\r\n"),
        );
        let client = Client::from_stream(stream).await.unwrap();
        let client = client.ehlo("c").await.unwrap();
        client.authenticate("user", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_recipient() {
        let stream = mock(
            Builder::new()
                .read(b"220 ready\r\n")
                .write(b"EHLO c\r\n")
                .read(b"250 s\r\n")
                .write(b"MAIL FROM:<a@x.com>\r\n")
                .read(b"250 OK\r\n")
                .write(b"RCPT TO:<nobody@x.com>\r\n")
                .read(b"550 5.1.1 unknown user\r\n"),
        );
        let client = Client::from_stream(stream).await.unwrap();
        let client = client.ehlo("c").await.unwrap();
        let client = client
            .mail_from(Address::new("a@x.com").unwrap(), Some(5))
            .await
            .unwrap();
        let err = client
            .rcpt_to(Address::new("nobody@x.com").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_starttls_requires_capability() {
        let stream = mock(
            Builder::new()
                .read(b"220 ready\r\n")
                .write(b"EHLO c\r\n")
                .read(b"250 s\r\n"),
        );
        let client = Client::from_stream(stream).await.unwrap();
        let client = client.ehlo("c").await.unwrap();
        let err = client.starttls("mx", "c").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_bad_greeting() {
        let stream = mock(Builder::new().read(b"554 go away\r\n"));
        assert!(Client::from_stream(stream).await.is_err());
    }
}
