use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use motorparts::remote::DEFAULT_POLL_INTERVAL;
use motorparts::{PollOptions, Session, Settings};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "motorparts", version, about = "Query and command vehicles on the Mopar owner portal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Account holder and vehicles, condensed
    Summary,
    /// Full profile document
    Profile,
    /// Flattened vehicle health report
    Report { index: usize },
    /// Tow guide for a vehicle
    TowGuide { index: usize },
    /// Send a remote command: LOCK, UNLOCK, START, STOP or HORN_LIGHT
    Command {
        name: String,
        index: usize,
        /// Return as soon as the portal accepts the command
        #[arg(long)]
        no_poll: bool,
        /// Give up polling after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Seconds between status checks
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
        interval: u64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "motorparts=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load configuration (set MOPAR_USERNAME, MOPAR_PASSWORD, MOPAR_PIN)")?;
    tracing::debug!(cookie_path = %settings.cookie_path.display(), "Configuration loaded");

    let session = Session::connect(settings.credentials(), settings.portal_config())
        .await
        .context("Failed to open portal session")?;

    match cli.command {
        Command::Summary => print_json(&session.summary().await?)?,
        Command::Profile => print_json(&session.profile().await?)?,
        Command::Report { index } => print_json(&session.report(index).await?)?,
        Command::TowGuide { index } => print_json(&session.tow_guide(index).await?)?,
        Command::Command {
            name,
            index,
            no_poll,
            timeout,
            interval,
        } => {
            let poll = (!no_poll).then(|| {
                let cancel = CancellationToken::new();
                let on_ctrl_c = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        on_ctrl_c.cancel();
                    }
                });
                let options = PollOptions::default()
                    .with_interval(Duration::from_secs(interval))
                    .with_cancel(cancel);
                match timeout {
                    Some(secs) => options.with_timeout(Duration::from_secs(secs)),
                    None => options,
                }
            });

            let outcome = session
                .remote_command(&name, index, poll)
                .await
                .with_context(|| format!("Remote command {name} failed"))?;
            print_json(&outcome)?;
        }
    }

    Ok(())
}
