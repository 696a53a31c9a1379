mod app;
mod cli;
mod paths;

#[cfg(feature = "tui")]
mod tui;

use anyhow::Context;
use clap::Parser;
use gptchat::driver::{Driver, Host, Phase, TICK_INTERVAL};
use gptchat::Severity;
use std::io::Write;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let cfg = gptchat::config::Config::load_optional(&config_path)?;
    tracing::debug!(?config_path, loaded = cfg.is_some(), "resolved config");

    let settings = app::Settings::resolve(&args, cfg.as_ref());

    match args.cmd {
        Some(cli::Command::Config) => {
            return app::cmd_config(&settings, &config_path, cfg.is_some());
        }
        #[cfg(feature = "tui")]
        Some(cli::Command::Tui) => {
            return tui::run_tui(settings).await;
        }
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: gptchat \"Hello\" or `gptchat tui` (feature flag)");
    }

    let transport = app::build_transport(&settings).context("failed to set up transport")?;
    let mut driver = Driver::new(transport, settings.keys.clone());
    let mut host = ConsoleHost::default();

    // Already reported through the host.
    if driver.submit(&mut host, settings.submission(prompt)).is_err() {
        std::process::exit(1);
    }

    let mut ticker = tokio::time::interval(host.interval.unwrap_or(TICK_INTERVAL));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while host.ticking {
        tokio::select! {
            _ = ticker.tick() => {
                driver.tick(&mut host);
            }
            _ = &mut ctrl_c, if host.cancel_armed => {
                driver.cancel(&mut host);
            }
        }
    }

    println!();
    match driver.phase() {
        Phase::Completed => Ok(()),
        Phase::Cancelled => std::process::exit(130),
        _ => std::process::exit(1),
    }
}

/// Prints deltas to stdout and notices to stderr.
#[derive(Debug, Default)]
struct ConsoleHost {
    ticking: bool,
    cancel_armed: bool,
    interval: Option<Duration>,
}

impl Host for ConsoleHost {
    fn register_tick(&mut self, interval: Duration) {
        self.ticking = true;
        self.interval = Some(interval);
    }

    fn unregister_tick(&mut self) {
        self.ticking = false;
    }

    fn register_cancel(&mut self) {
        self.cancel_armed = true;
    }

    fn unregister_cancel(&mut self) {
        self.cancel_armed = false;
    }

    fn notify(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::debug!("{message}"),
            Severity::Warning => eprintln!("warning: {message}"),
            Severity::Error => eprintln!("error: {message}"),
        }
    }

    fn buffer_appended(&mut self, delta: &str) {
        let mut out = std::io::stdout();
        out.write_all(delta.as_bytes()).ok();
        out.flush().ok();
    }
}
