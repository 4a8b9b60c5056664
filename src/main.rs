//! taxii2-feed
//!
//! Command-line host for the TAXII 2 feed: one command per invocation, or
//! scheduled fetch cycles with `poll`.

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taxii2_feed::commands::poll::{self, PollArgs};
use taxii2_feed::commands::{Command, dispatch};
use taxii2_feed::config::InstanceArgs;
use taxii2_feed::error::command_failure_message;
use taxii2_feed::models::{CONTEXT_PREFIX, CommandOutput};
use taxii2_feed::storage::Backends;
use taxii2_feed::{FeedError, Taxii2FeedClient};

/// TAXII 2 feed
#[derive(Parser, Debug)]
#[command(name = "taxii2-feed")]
#[command(about = "Poll a TAXII 2 server and ingest STIX indicators")]
struct Cli {
    #[command(flatten)]
    instance: InstanceArgs,

    /// How command results are printed
    #[arg(long, value_enum, default_value = "markdown")]
    output: OutputFormat,

    /// Emit logs as JSON
    #[arg(long, env = "TAXII2_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run fetch cycles on a cron schedule until interrupted
    Poll(PollArgs),

    #[command(flatten)]
    Run(Command),
}

impl Mode {
    fn name(&self) -> &'static str {
        match self {
            Mode::Poll(_) => "poll",
            Mode::Run(command) => command.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    // stdout carries command results, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taxii2_feed=info".into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init()
        .context("Failed to initialise logging")
}

fn print_output(output: &CommandOutput, format: OutputFormat) -> Result<(), FeedError> {
    match format {
        OutputFormat::Markdown => println!("{}", output.readable()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output.to_json())?),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), FeedError> {
    cli.instance.check()?;

    match cli.mode {
        Mode::Poll(args) => poll::run(cli.instance, &args).await,
        Mode::Run(command) => {
            let mut client = Taxii2FeedClient::new(cli.instance.client_config())?;
            client.initialise().await?;
            let backends = Backends::open(&cli.instance).await?;

            if let Some(output) = dispatch(&command, &client, &backends, &cli.instance).await? {
                print_output(&output, cli.output)?;
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_json) {
        eprintln!("{:#}", e);
    }

    let command = cli.mode.name();
    tracing::info!("Command being called in {} is {}", CONTEXT_PREFIX, command);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(command, error = %e, "Command failed");
            eprintln!("{}", command_failure_message(command, &e));
            if e.is_configuration() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
