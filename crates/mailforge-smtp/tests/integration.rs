//! Integration tests for one-shot submission.
//!
//! A scripted server on a loopback socket answers every command, so these
//! tests exercise the full TCP path without a real mail server.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use mailforge_smtp::{Error, Security, SmtpOptions, submit};

/// What the scripted server saw.
#[derive(Debug, Default)]
struct Transcript {
    commands: Vec<String>,
    data: Vec<u8>,
}

/// Accepts one connection and answers like a permissive server, rejecting
/// recipients listed in `reject`.
async fn scripted_server(reject: &'static [&'static str]) -> (u16, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        let mut transcript = Transcript::default();

        write.write_all(b"220 mx.test ESMTP\r\n").await.unwrap();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let command = line.trim_end().to_string();
            transcript.commands.push(command.clone());
            let upper = command.to_ascii_uppercase();

            let reply: &[u8] = if upper.starts_with("EHLO") {
                b"250-mx.test\r\n250-AUTH PLAIN LOGIN\r\n250 SIZE 10000\r\n"
            } else if upper.starts_with("AUTH") {
                b"235 ok\r\n"
            } else if upper.starts_with("RCPT") && reject.iter().any(|r| command.contains(r)) {
                b"550 no such user\r\n"
            } else if upper == "DATA" {
                write.write_all(b"354 go ahead\r\n").await.unwrap();
                loop {
                    line.clear();
                    reader.read_line(&mut line).await.unwrap();
                    if line == ".\r\n" {
                        break;
                    }
                    transcript.data.extend_from_slice(line.as_bytes());
                }
                b"250 queued\r\n"
            } else if upper == "QUIT" {
                write.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                b"250 ok\r\n"
            };
            write.write_all(reply).await.unwrap();
        }
        transcript
    });

    (port, handle)
}

fn options(port: u16) -> SmtpOptions {
    SmtpOptions {
        host: "127.0.0.1".to_string(),
        port,
        security: Security::None,
        hello: "client.test".to_string(),
        timeout: Duration::from_secs(5),
        ..SmtpOptions::default()
    }
}

#[tokio::test]
async fn test_submit_session() {
    let (port, server) = scripted_server(&[]).await;
    let mut options = options(port);
    options.username = Some("user".to_string());
    options.password = Some("pass".to_string());

    let message = b"Subject: Hi\n\n.leading dot\nbody\n";
    submit(
        &options,
        "a@example.com",
        &["b@example.com".to_string(), "c@example.com".to_string()],
        message,
    )
    .await
    .unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(
        transcript.commands,
        [
            "EHLO client.test",
            "AUTH PLAIN AHVzZXIAcGFzcw==",
            "MAIL FROM:<a@example.com> SIZE=31",
            "RCPT TO:<b@example.com>",
            "RCPT TO:<c@example.com>",
            "DATA",
            "QUIT",
        ]
    );
    assert_eq!(transcript.data, b"Subject: Hi\r\n\r\n..leading dot\r\nbody\r\n");
}

#[tokio::test]
async fn test_rejected_recipient_aborts() {
    let (port, server) = scripted_server(&["nobody@example.com"]).await;
    let err = submit(
        &options(port),
        "a@example.com",
        &["nobody@example.com".to_string()],
        b"Subject: Hi\n\nbody\n",
    )
    .await
    .unwrap_err();

    assert!(err.is_permanent());
    assert!(matches!(err, Error::Rejected { code: 550, .. }));
    server.abort();
}

#[tokio::test]
async fn test_no_recipients() {
    let err = submit(&options(1), "a@example.com", &[], b"x").await.unwrap_err();
    assert!(matches!(err, Error::NoRecipients));
}

#[tokio::test]
async fn test_invalid_sender() {
    let err = submit(&options(1), "not an address", &["b@example.com".to_string()], b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));
}
