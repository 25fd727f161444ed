//! Domestique daemon entry point
//!
//! # Usage
//!
//! ```bash
//! # Run the hourly scheduler (normal deployment)
//! domestique daemon
//!
//! # Evaluate and record today's decision once, even if already recorded
//! domestique run-once --force
//!
//! # Evaluate without recording, uploading, or notifying
//! domestique preview
//! ```
//!
//! # Environment Variables
//!
//! - `FITNESS_API_KEY` / `FITNESS_ATHLETE_ID`: fitness service credentials (required)
//! - `ANTHROPIC_API_KEY`: enables the generative advisor
//! - `WEARABLE_ACCESS_TOKEN`: enables the wearable recovery feed
//! - `DATABASE_URL`: sqlite path for the run ledger
//! - `RUST_LOG`: logging level (default: info)

use chrono::{Local, Timelike};
use clap::{Parser, Subcommand};

use domestique::advisor::{Advisor, ClaudeAdvisor};
use domestique::config::Config;
use domestique::db::{self, SqliteRunLedger};
use domestique::intervals::IntervalsClient;
use domestique::notify::{format_report, LogNotifier};
use domestique::pipeline;
use domestique::scheduler::{Engine, TickOutcome};
use domestique::selector::Sport;
use domestique::whoop::{RecoveryService, WhoopClient};

#[derive(Parser)]
#[command(name = "domestique")]
#[command(about = "Automated endurance coach - one training decision per day", long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the hourly scheduler until stopped
  Daemon,
  /// Evaluate and record today's decision once
  RunOnce {
    /// Run even if today is already recorded and recovery data is missing
    #[arg(long)]
    force: bool,
  },
  /// Evaluate today's decision without recording or uploading anything
  Preview,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  dotenvy::dotenv().ok();

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_target(false)
    .init();

  let cli = Cli::parse();
  let config = Config::from_env()?;

  let fitness = IntervalsClient::new(
    &config.fitness_base_url,
    &config.fitness_athlete_id,
    &config.fitness_api_key,
  )?;

  let advisor: Option<ClaudeAdvisor> = match &config.advisor_api_key {
    Some(key) => match ClaudeAdvisor::new(key) {
      Ok(client) => Some(client),
      Err(e) => {
        tracing::warn!(error = %e, "advisor disabled");
        None
      }
    },
    None => None,
  };

  let wearable: Option<WhoopClient> = match &config.wearable_token {
    Some(token) => match WhoopClient::new(&config.wearable_base_url, token) {
      Ok(client) => Some(client),
      Err(e) => {
        tracing::warn!(error = %e, "wearable feed disabled");
        None
      }
    },
    None => None,
  };

  let sport = Sport::parse(&config.primary_sport).unwrap_or(Sport::Ride);

  if let Commands::Preview = cli.command {
    // No ledger, no upload, no notification: just show the decision
    let inputs = pipeline::gather(
      &fitness,
      wearable.as_ref().map(|w| w as &dyn RecoveryService),
      Local::now().date_naive(),
      config.target_eftp,
      sport,
    )
    .await?;

    let decision = pipeline::decide(&inputs, advisor.as_ref().map(|a| a as &dyn Advisor)).await;
    println!("{}", format_report(&decision));
    return Ok(());
  }

  let pool = db::initialize_db(&config.database_url).await?;
  let ledger = SqliteRunLedger::new(pool);
  let notifier = LogNotifier;

  let engine = Engine {
    fitness: &fitness,
    wearable: wearable.as_ref().map(|w| w as &dyn RecoveryService),
    advisor: advisor.as_ref().map(|a| a as &dyn Advisor),
    ledger: &ledger,
    notifier: &notifier,
    target_eftp: config.target_eftp,
    sport,
    readiness_deadline_hour: config.readiness_deadline_hour,
  };

  if let Commands::RunOnce { force } = cli.command {
    let now = Local::now();
    match engine.tick(now.date_naive(), now.hour(), force).await? {
      TickOutcome::Ran(decision) => println!("{}", format_report(&decision)),
      TickOutcome::AlreadyRan => println!("Already ran today; use --force to rerun."),
      TickOutcome::NotReady => {
        println!("Today's recovery data has not arrived yet; try again later.")
      }
    }
  } else {
    tracing::info!("starting hourly scheduler");
    engine.run_daemon().await;
  }

  Ok(())
}
