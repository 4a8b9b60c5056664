//! Scheduled fetch cycles

use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::collectors::{Taxii2FeedClient, Taxii2Source};
use crate::commands::fetch::run_fetch_cycle;
use crate::config::{ClientConfig, InstanceArgs};
use crate::error::FeedError;
use crate::storage::Backends;

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PollArgs {
    /// Cron expression with seconds, e.g. "0 */30 * * * *"
    #[arg(long, env = "TAXII2_SCHEDULE", default_value = "0 */30 * * * *")]
    pub schedule: String,

    /// Run one cycle immediately instead of waiting for the first tick
    #[arg(long)]
    pub run_now: bool,
}

/// Opens a fresh, initialised source for each cycle
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Taxii2Source>, FeedError>;
}

#[async_trait]
impl Connector for ClientConfig {
    async fn connect(&self) -> Result<Arc<dyn Taxii2Source>, FeedError> {
        let mut client = Taxii2FeedClient::new(self.clone())?;
        client.initialise().await?;
        Ok(Arc::new(client))
    }
}

/// What one scheduler tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Skipped,
    Fetched(usize),
    Failed,
}

struct Poller {
    connector: Box<dyn Connector>,
    initial_interval: String,
    limit: i64,
    backends: Backends,
    // Held for the duration of a cycle
    running: Mutex<()>,
}

impl Poller {
    fn new(
        connector: Box<dyn Connector>,
        initial_interval: impl Into<String>,
        limit: i64,
        backends: Backends,
    ) -> Self {
        Self {
            connector,
            initial_interval: initial_interval.into(),
            limit,
            backends,
            running: Mutex::new(()),
        }
    }

    async fn cycle(&self) -> Result<usize, FeedError> {
        let source = self.connector.connect().await?;
        run_fetch_cycle(
            source.as_ref(),
            self.backends.context.as_ref(),
            self.backends.sink.as_ref(),
            &self.initial_interval,
            self.limit,
        )
        .await
    }

    async fn run_cycle(&self) -> Tick {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Previous fetch cycle still running, skipping this tick");
            return Tick::Skipped;
        };
        match self.cycle().await {
            Ok(count) => {
                info!(indicators = count, "Scheduled fetch finished");
                Tick::Fetched(count)
            }
            Err(e) => {
                error!(error = %e, "Scheduled fetch failed");
                Tick::Failed
            }
        }
    }
}

fn scheduler_error(e: impl std::fmt::Debug) -> FeedError {
    FeedError::Scheduler(format!("{:?}", e))
}

/// Run fetch cycles on `args.schedule` until Ctrl-C
pub async fn run(instance: InstanceArgs, args: &PollArgs) -> Result<(), FeedError> {
    let limit = instance.fetch_limit()?;
    let backends = Backends::open(&instance).await?;
    let poller = Arc::new(Poller::new(
        Box::new(instance.client_config()),
        instance.initial_interval.clone(),
        limit,
        backends,
    ));

    let mut scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
    let job_poller = poller.clone();
    let job = Job::new_async(args.schedule.as_str(), move |_id, _scheduler| {
        let poller = job_poller.clone();
        Box::pin(async move {
            poller.run_cycle().await;
        })
    })
    .map_err(|e| FeedError::config(format!("Invalid schedule {}: {:?}", args.schedule, e)))?;

    scheduler.add(job).await.map_err(scheduler_error)?;
    scheduler.start().await.map_err(scheduler_error)?;
    info!(schedule = %args.schedule, "Polling TAXII server");

    if args.run_now {
        poller.run_cycle().await;
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler");
    scheduler.shutdown().await.map_err(scheduler_error)?;
    Ok(())
}
