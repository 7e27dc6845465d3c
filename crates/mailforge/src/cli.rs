//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mailforge_core::{Renderer, Security};

/// Render a template into an email and print or send it.
#[derive(Debug, Parser)]
#[command(name = "mailforge", version, about)]
pub struct Cli {
    /// Template file, template directory, or `-` for stdin.
    pub source: String,

    /// Template name (required when SOURCE is a directory).
    #[arg(long)]
    pub name: Option<String>,

    /// Template parameter, as KEY=VALUE.
    #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Parameters as a YAML mapping: a file path, `-` for stdin, or inline YAML.
    #[arg(short = 'y', long)]
    pub yaml: Option<String>,

    /// YAML settings file applied before everything else.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Template engine.
    #[arg(long, value_enum, default_value_t = RendererArg::Jinja)]
    pub renderer: RendererArg,

    /// Message header, as NAME=VALUE.
    #[arg(long = "header", value_parser = parse_key_value)]
    pub headers: Vec<(String, String)>,

    /// What to produce.
    #[arg(long, value_enum, default_value_t = Output::SmtpDump)]
    pub output: Output,

    /// Envelope sender (defaults to the From header).
    #[arg(long)]
    pub from: Option<String>,

    /// Envelope recipient (defaults to To, Cc and Bcc).
    #[arg(long)]
    pub to: Vec<String>,

    /// SMTP server host.
    #[arg(long)]
    pub host: Option<String>,

    /// SMTP server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// SMTP connection security.
    #[arg(long, value_enum)]
    pub security: Option<SecurityArg>,

    /// SMTP login name.
    #[arg(long)]
    pub username: Option<String>,

    /// SMTP password.
    #[arg(long, env = "MAILFORGE_SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// More logging; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        format!("mailforge={level},mailforge_core={level},mailforge_smtp={level}")
    }
}

/// Template engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RendererArg {
    /// Jinja syntax.
    Jinja,
    /// Sources used as-is.
    Verbatim,
}

impl From<RendererArg> for Renderer {
    fn from(arg: RendererArg) -> Self {
        match arg {
            RendererArg::Jinja => Self::Jinja,
            RendererArg::Verbatim => Self::Verbatim,
        }
    }
}

/// SMTP connection security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecurityArg {
    /// Plain TCP.
    None,
    /// Upgrade with STARTTLS.
    Starttls,
    /// Implicit TLS.
    Tls,
}

impl From<SecurityArg> for Security {
    fn from(arg: SecurityArg) -> Self {
        match arg {
            SecurityArg::None => Self::None,
            SecurityArg::Starttls => Self::StartTls,
            SecurityArg::Tls => Self::Tls,
        }
    }
}

/// Output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Output {
    /// The plain-text body.
    Text,
    /// The HTML body, with embedded images inlined as data URIs.
    Html,
    /// The full message as it would be submitted.
    SmtpDump,
    /// Submit over SMTP.
    Send,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value() {
        assert_eq!(
            parse_key_value("name=Joe = Jr").unwrap(),
            ("name".to_string(), "Joe = Jr".to_string())
        );
        assert_eq!(parse_key_value("empty=").unwrap().1, "");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "mailforge",
            "welcome.html",
            "-p",
            "name=Joe",
            "--header",
            "Subject=Hi",
            "--output",
            "send",
            "--to",
            "a@example.com",
            "--to",
            "b@example.com",
            "--security",
            "starttls",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.source, "welcome.html");
        assert_eq!(cli.params, [("name".to_string(), "Joe".to_string())]);
        assert_eq!(cli.headers, [("Subject".to_string(), "Hi".to_string())]);
        assert_eq!(cli.output, Output::Send);
        assert_eq!(cli.to.len(), 2);
        assert_eq!(Security::from(cli.security.unwrap()), Security::StartTls);
        assert_eq!(Renderer::from(cli.renderer), Renderer::Jinja);
        assert!(cli.log_filter().starts_with("mailforge=debug"));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mailforge", "-"]).unwrap();
        assert_eq!(cli.output, Output::SmtpDump);
        assert_eq!(cli.verbose, 0);
        assert!(Cli::try_parse_from(["mailforge", "-", "--output", "pdf"]).is_err());
    }
}
