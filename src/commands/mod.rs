//! Command surface exposed to the host

pub mod fetch;
pub mod listing;
pub mod poll;

use chrono::Utc;
use clap::{Args, Subcommand};

use crate::collectors::Taxii2Source;
use crate::config::InstanceArgs;
use crate::error::FeedError;
use crate::models::CommandOutput;
use crate::storage::Backends;

pub use fetch::{fetch_indicators_command, run_fetch_cycle};
pub use listing::{
    get_collections_command, get_indicators_command, module_test_command, reset_fetch_command,
};

/// Commands that run once against an initialised client
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check that the server lists at least one collection
    #[command(name = "test-module")]
    TestModule,

    /// Run one fetch cycle and ingest the indicators
    #[command(name = "fetch-indicators")]
    FetchIndicators,

    /// List indicators without touching the fetch cursor
    #[command(name = "taxii2-get-indicators")]
    GetIndicators(GetIndicatorsArgs),

    /// List the collections on the server
    #[command(name = "taxii2-get-collections")]
    GetCollections,

    /// Forget the fetch cursor
    #[command(name = "taxii2-reset-fetch-indicators")]
    ResetFetchIndicators,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::TestModule => "test-module",
            Command::FetchIndicators => "fetch-indicators",
            Command::GetIndicators(_) => "taxii2-get-indicators",
            Command::GetCollections => "taxii2-get-collections",
            Command::ResetFetchIndicators => "taxii2-reset-fetch-indicators",
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GetIndicatorsArgs {
    /// "true" returns only the raw STIX objects
    #[arg(long, default_value = "false")]
    pub raw: String,

    #[arg(long, default_value = "10", allow_hyphen_values = true)]
    pub limit: String,

    /// Only indicators added after this time range, e.g. "3 days"
    #[arg(long)]
    pub added_after: Option<String>,
}

impl Default for GetIndicatorsArgs {
    fn default() -> Self {
        Self {
            raw: "false".to_string(),
            limit: "10".to_string(),
            added_after: None,
        }
    }
}

/// Run `command` to completion. `None` means there is nothing to show.
pub async fn dispatch(
    command: &Command,
    source: &dyn Taxii2Source,
    backends: &Backends,
    instance: &InstanceArgs,
) -> Result<Option<CommandOutput>, FeedError> {
    let output = match command {
        Command::TestModule => Some(module_test_command(source)?),
        Command::FetchIndicators => {
            let limit = instance.fetch_limit()?;
            run_fetch_cycle(
                source,
                backends.context.as_ref(),
                backends.sink.as_ref(),
                &instance.initial_interval,
                limit,
            )
            .await?;
            None
        }
        Command::GetIndicators(args) => {
            Some(get_indicators_command(source, args, Utc::now()).await?)
        }
        Command::GetCollections => Some(get_collections_command(source)),
        Command::ResetFetchIndicators => {
            Some(reset_fetch_command(backends.context.as_ref()).await?)
        }
    };
    Ok(output)
}
