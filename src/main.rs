mod arxiv;
mod classify;
mod config;
mod deliver;
mod digest;
mod run;
mod state;

pub const USER_AGENT: &str = concat!("arxiv-notify/", env!("CARGO_PKG_VERSION"));

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tracing::{error, info};

use arxiv::ArxivClient;
use config::Config;
use deliver::SmtpMailer;
use state::StateStore;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll arXiv for a saved query and deliver a digest of new and updated papers.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Search the last N days instead of everything since the previous run
    #[arg(allow_negative_numbers = true)]
    days: Option<i64>,

    /// YAML configuration file
    #[arg(long, env = "ARXIV_NOTIFY_CONFIG", default_value = "arxiv-notification-config.yml")]
    config: PathBuf,

    /// JSON file recording the last run and every paper already reported
    #[arg(long, env = "ARXIV_NOTIFY_STATE", default_value = "arxiv-notification-data.json")]
    state: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("mail setup: {0}")]
    Mail(#[from] deliver::MailError),

    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Run(#[from] run::RunError),
}

async fn execute(cli: Cli) -> Result<run::RunReport, AppError> {
    let config = Config::load(&cli.config)?;
    let mailer = if config.send_results_as_email {
        Some(SmtpMailer::new(&config.mail_settings()?)?)
    } else {
        None
    };

    let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
    let feed = ArxivClient::new(http);
    let store = StateStore::new(cli.state);

    let report = run::run(
        &config,
        &store,
        &feed,
        mailer.as_ref(),
        cli.days,
        chrono::Utc::now(),
    )
    .await?;
    Ok(report)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "arxiv_notify=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    info!(config = %cli.config.display(), state = %cli.state.display(), "starting arxiv-notify");

    match execute(cli).await {
        Ok(report) => {
            info!(
                in_window = report.in_window,
                new = report.new,
                updated = report.updated,
                notified = report.notified,
                "run finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_days_is_optional_positional() {
        let cli = Cli::try_parse_from(["arxiv-notify"]).unwrap();
        assert_eq!(cli.days, None);

        let cli = Cli::try_parse_from(["arxiv-notify", "7", "--state", "s.json"]).unwrap();
        assert_eq!(cli.days, Some(7));
        assert_eq!(cli.state, PathBuf::from("s.json"));
    }

    #[test]
    fn cli_accepts_negative_days() {
        let cli = Cli::try_parse_from(["arxiv-notify", "-2"]).unwrap();
        assert_eq!(cli.days, Some(-2));
    }

    #[test]
    fn cli_rejects_non_integer_days() {
        assert!(Cli::try_parse_from(["arxiv-notify", "seven"]).is_err());
    }
}
