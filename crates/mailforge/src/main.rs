//! `mailforge` - render template-driven email from the command line.
//!
//! Prints the plain-text body, the standalone HTML body or the full message,
//! or submits the message over SMTP.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod source;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mailforge_core::{
    DeliveryAgent, ManagerBuilder, RecordingAgent, Settings, SettingsFile, SmtpAgent, SmtpOptions,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Output};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    if cli.source == source::STDIN && cli.yaml.as_deref() == Some(source::STDIN) {
        bail!("standard input cannot hold both the template and the parameters");
    }

    let mut defaults = Settings::default();
    let mut smtp = SmtpOptions::default();
    if let Some(path) = &cli.settings {
        let file = SettingsFile::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        file.apply(&mut defaults)?;
        if let Some(options) = &file.smtp {
            smtp = options.clone();
        }
    }
    override_smtp(cli, &mut smtp);

    let (provider, name) = source::provider(&cli.source, cli.name.as_deref(), cli.renderer.into())?;
    let agent: Arc<dyn DeliveryAgent> = match cli.output {
        Output::Send => Arc::new(SmtpAgent::new(smtp)),
        _ => Arc::new(RecordingAgent::new()),
    };
    let manager = ManagerBuilder::new(provider)
        .defaults(defaults)
        .agent(agent)
        .build();

    let mut message = manager
        .new_message(&name)
        .with_context(|| format!("failed to load template `{name}`"))?;
    if let Some(yaml) = &cli.yaml {
        for (key, value) in source::yaml_params(yaml)? {
            message.set_param(key, value);
        }
    }
    for (key, value) in &cli.params {
        message.set_param(key.as_str(), value.as_str());
    }
    for (header, value) in &cli.headers {
        message.set_header(header.as_str(), value.as_str());
    }

    match cli.output {
        Output::Text => print(&message.text()?),
        Output::Html => print(&message.html(true)?),
        Output::SmtpDump => print(&message.smtp_data()?),
        Output::Send => {
            let recipients = (!cli.to.is_empty()).then_some(cli.to.as_slice());
            message
                .send(cli.from.as_deref(), recipients)
                .context("failed to send message")?;
            info!(template = %name, "message sent");
            Ok(())
        }
    }
}

fn override_smtp(cli: &Cli, smtp: &mut SmtpOptions) {
    if let Some(host) = &cli.host {
        smtp.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        smtp.port = port;
    }
    if let Some(security) = cli.security {
        smtp.security = security.into();
    }
    if cli.username.is_some() {
        smtp.username.clone_from(&cli.username);
    }
    if cli.password.is_some() {
        smtp.password.clone_from(&cli.password);
    }
}

fn print(text: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
