//! postbox: dispatch unsent emails from Postgres over SMTP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use postbox_core::app::health::connect_with_retry;
use postbox_core::app::{App, AppBuilder, CycleReport, Readiness, SeedReport};
use postbox_core::config::Config;
use postbox_core::domain::FatalError;
use postbox_core::impls::{PgMessageStore, SmtpNotifier};
use postbox_core::observability;
use postbox_core::ports::MessageStore;

/// Poll a Postgres table for unsent emails and relay them over SMTP
#[derive(Parser, Debug)]
#[command(name = "postbox")]
#[command(about = "Relay unsent emails from Postgres over SMTP", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the poller and seeder until Ctrl-C
    Run {
        /// Do not seed sample rows
        #[arg(long)]
        no_seed: bool,

        /// Rows dispatched per poll
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Run a single dispatch cycle and print its report
    PollOnce,
    /// Insert the sample rows once and print the report
    SeedOnce,
    /// Connect and create the emails table if missing
    InitDb,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(fatal) = err.downcast_ref::<FatalError>() {
                error!(error = %fatal, "shutting down");
                eprintln!("postbox: {err:#}");
                return ExitCode::from(fatal.exit_code());
            }
            eprintln!("postbox: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Commands::Run {
        no_seed,
        batch_size,
    } = &cli.command
    {
        if *no_seed {
            config.schedule.seed_enabled = false;
        }
        if let Some(n) = batch_size {
            config.schedule.batch_size = *n;
        }
    }

    observability::init(&config.log).context("initialising logging")?;

    let store = Arc::new(PgMessageStore::new(&config.store));
    let notifier = Arc::new(SmtpNotifier::new(&config.mail));

    match cli.command {
        Commands::InitDb => init_db(store.as_ref(), &config).await,
        Commands::Run { .. } => serve(build_app(&config, store, notifier)?).await,
        Commands::PollOnce => {
            let app = build_app(&config, store, notifier)?;
            app.bootstrap().await?;
            print_cycle(&app.poller().run_cycle().await?);
            Ok(())
        }
        Commands::SeedOnce => {
            let app = build_app(&config, store, notifier)?;
            app.bootstrap().await?;
            print_seed(&app.seeder().run_cycle().await?);
            Ok(())
        }
    }
}

fn build_app(
    config: &Config,
    store: Arc<PgMessageStore>,
    notifier: Arc<SmtpNotifier>,
) -> anyhow::Result<App> {
    AppBuilder::from_config(config, store, notifier)
        .build()
        .context("invalid settings")
}

async fn serve(app: App) -> anyhow::Result<()> {
    let scheduler = app.start().await?;
    let handle = scheduler.shutdown_handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C, finishing current cycle"),
            Err(err) => error!(error = %err, "could not listen for Ctrl-C"),
        }
        handle.request();
    });

    info!(timers = scheduler.len(), "postbox running");
    scheduler.join().await?;
    info!("postbox stopped");
    Ok(())
}

async fn init_db(store: &PgMessageStore, config: &Config) -> anyhow::Result<()> {
    if connect_with_retry(store, &config.connect_policy()).await? == Readiness::Skipped {
        anyhow::bail!("store unavailable");
    }
    store
        .ensure_table_exists()
        .await
        .context("creating emails table")?;
    println!("emails table ready");
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    println!(
        "{} fetched={} delivered={} failed={} marked={}",
        report.started_at.to_rfc3339(),
        report.fetched,
        report.delivered,
        report.failed,
        report.marked,
    );
}

fn print_seed(report: &SeedReport) {
    println!(
        "{} inserted={}",
        report.started_at.to_rfc3339(),
        report.inserted
    );
}
