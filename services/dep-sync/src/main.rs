//! Enrollment token sync and device removal tool
//!
//! Single binary that:
//! 1. Keeps every Apple enrollment program token synchronizing, one trigger
//!    per token per cooldown window (`sync`)
//! 2. Removes a device from device management and then from its enrollment
//!    roster, verifying in between (`remove`)
//! 3. Prints each token's sync status (`status`)

mod config;
mod console;
mod error;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use enrollment_client::{EnrollmentService, GraphClient};
use enrollment_sync::{CancelFlag, RemovalWorkflow, Scheduler, SystemClock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::console::{ConsoleObserver, ConsoleOperator};

#[derive(Debug, Parser)]
#[command(name = "dep-sync", version, about = "Enrollment token sync and device removal")]
struct Cli {
    /// Config file (default: CONFIG_PATH env, then ./dep-sync.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Trigger every token as soon as its cooldown allows, until stopped
    Sync,
    /// Remove a device by serial number from both registries
    Remove {
        /// Serial number; prompted for when omitted
        serial: Option<String>,
        /// Answer yes to every confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Show each token's last sync and cooldown state
    Status,
}

/// Remote service and scheduler shared by every command.
struct App {
    config: Config,
    service: Arc<dyn EnrollmentService>,
    scheduler: Arc<Scheduler>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.graph.timeout())
            .build()
            .context("building HTTP client")?;
        let tokens = Arc::new(config.graph.token_source()?);
        info!(
            base_url = %config.graph.base_url,
            auth = tokens.kind(),
            "graph client ready"
        );
        let service: Arc<dyn EnrollmentService> =
            Arc::new(GraphClient::new(http, &config.graph.base_url, tokens));

        let cancel = CancelFlag::new();
        let scheduler = Scheduler::new(service.clone(), Arc::new(SystemClock))
            .with_cancel(cancel.clone())
            .with_observer(Arc::new(ConsoleObserver::new(cancel)));

        Ok(Self {
            config,
            service,
            scheduler: Arc::new(scheduler),
        })
    }

    async fn sync(&self) -> Result<()> {
        let cancel = self.scheduler.cancel_flag().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received SIGINT, stopping at the next countdown tick");
                cancel.request();
            }
        });

        let outcome = self.scheduler.run_continuous().await;
        println!(
            "Stopped after {} pass(es), {} sync(s) triggered",
            outcome.passes, outcome.triggered
        );
        Ok(())
    }

    async fn remove(&self, serial: Option<String>, assume_yes: bool) -> Result<()> {
        let prompted = serial.is_none();
        let workflow = RemovalWorkflow::new(
            self.service.clone(),
            self.scheduler.clone(),
            Arc::new(ConsoleOperator::new(assume_yes)),
        )
        .with_settle_delay(self.config.settle_delay());

        let mut next = serial;
        loop {
            let serial = match next.take() {
                Some(serial) => serial.trim().to_string(),
                None => console::prompt_serial()?.unwrap_or_default(),
            };
            if serial.is_empty() {
                println!("No serial number entered, nothing to do");
                return Ok(());
            }

            let outcome = workflow.run(&serial).await;
            metrics::record_removal(&outcome);
            let outcome =
                outcome.with_context(|| format!("removal of {serial} stopped"))?;
            println!("{}", console::describe_outcome(&serial, &outcome));

            if !prompted || !console::ask("Remove another device?")? {
                return Ok(());
            }
        }
    }

    async fn status(&self) -> Result<()> {
        let tokens = self
            .service
            .list_enrollment_tokens()
            .await
            .context("listing enrollment tokens")?;
        if tokens.is_empty() {
            println!("No enrollment tokens found");
            return Ok(());
        }
        println!("{}", console::status_table(&tokens, self.scheduler.clock()));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::resolve(cli.config.as_deref())
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if let Some(addr) = config.metrics.listen_addr {
        metrics::install_exporter(addr)?;
        info!(%addr, "metrics exporter listening");
    }

    let app = App::build(config)?;
    let result = match cli.command {
        Command::Sync => app.sync().await,
        Command::Remove { serial, yes } => app.remove(serial, yes).await,
        Command::Status => app.status().await,
    };
    if let Err(e) = &result {
        warn!(error = %format!("{e:#}"), "command failed");
    }
    result
}
