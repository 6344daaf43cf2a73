//! Operator CLI for the strategy configuration tuner.
//!
//! Usage:
//!   cargo run --bin tuner -- analyze S1
//!   cargo run --bin tuner -- generate S1
//!   cargo run --bin tuner -- approve <proposal_id> --by alice
//!   cargo run --bin tuner -- apply-batch --strategy S1 --max 5
//!   cargo run --bin tuner -- revert <change_id> --reason "sharpe dropped"

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use eyre::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use strategy_config_tuner::config::Config;
use strategy_config_tuner::db::db_manager::DbManager;
use strategy_config_tuner::logging;
use strategy_config_tuner::meta::applicator::{BatchSummary, ProposalApplicator};
use strategy_config_tuner::meta::meta_constants::{DEFAULT_BATCH_SIZE, DEFAULT_CHANGE_LIST_LIMIT};
use strategy_config_tuner::meta::proposal_generator::ProposalGenerator;
use strategy_config_tuner::meta::store::{ChangeFilter, MetaStore, ProposalFilter};
use strategy_config_tuner::meta::types::ProposalStatus;

#[derive(Parser, Debug)]
#[command(name = "tuner")]
#[command(about = "Diagnose strategy backtests and manage configuration proposals")]
struct Args {
    /// Validate and report without mutating configs, proposals or the change log
    #[arg(long, global = true)]
    dry_run: bool,

    /// Operator identity recorded on approvals, applications and reversions
    #[arg(long, global = true, env = "USER", default_value = "system")]
    by: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a diagnostic report for a strategy
    Analyze {
        strategy_id: String,
        #[arg(long)]
        min_samples: Option<usize>,
    },
    /// Generate improvement proposals for a strategy
    Generate {
        strategy_id: String,
        /// Print the proposals without saving them
        #[arg(long)]
        no_save: bool,
    },
    /// List proposals
    List {
        #[arg(long)]
        strategy: Option<String>,
        /// PENDING, APPROVED, REJECTED, APPLIED or REVERTED
        #[arg(long)]
        status: Option<String>,
    },
    Approve {
        proposal_id: String,
    },
    Reject {
        proposal_id: String,
    },
    /// Apply one approved proposal
    Apply {
        proposal_id: String,
    },
    /// Apply approved proposals in order of expected Sharpe improvement, stopping at the first failure
    ApplyBatch {
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        max: usize,
    },
    /// Restore the value a change overwrote
    Revert {
        change_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Compare performance before and after a change
    Evaluate {
        change_id: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// List applied changes, newest first
    Changes {
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        reverted: Option<bool>,
        #[arg(long, default_value_t = DEFAULT_CHANGE_LIST_LIMIT)]
        limit: usize,
    },
    /// Print the live configuration of a strategy
    ShowConfig {
        strategy_id: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables from .env file, if present
    dotenv().ok();

    if let Err(e) = logging::init_logging(env!("CARGO_BIN_NAME").to_string()) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e);
    }

    let cfg = Config::load()?;
    let dry_run = args.dry_run || cfg.dry_run;
    info!(dry_run, by = %args.by, "Configuration loaded and logging initialized");

    let store = Arc::new(DbManager::init(&cfg).await?);
    let generator = ProposalGenerator::new(store.clone(), cfg.diagnostic_thresholds, cfg.risk_limit_source()?)
        .with_thresholds(cfg.proposal_thresholds)
        .with_min_sample_size(cfg.min_sample_size);
    let applicator = ProposalApplicator::new(store.clone()).with_dry_run(dry_run);

    match args.command {
        Command::Analyze { strategy_id, min_samples } => {
            let min_samples = min_samples.unwrap_or(cfg.min_sample_size);
            let report = generator
                .diagnostics()
                .analyze_strategy(&strategy_id, min_samples)
                .await?;
            print_json(&report)?;
        }
        Command::Generate { strategy_id, no_save } => {
            let proposals = generator.generate_proposals(&strategy_id, !no_save).await?;
            print_json(&proposals)?;
        }
        Command::List { strategy, status } => {
            let status = match status {
                Some(raw) => Some(
                    ProposalStatus::from_str(&raw).ok_or_else(|| eyre::eyre!("Unknown status {}", raw))?,
                ),
                None => None,
            };
            let filter = ProposalFilter {
                strategy_id: strategy,
                status,
                limit: None,
            };
            print_json(&store.load_proposals(&filter).await?)?;
        }
        Command::Approve { proposal_id } => {
            generator.approve_proposal(&proposal_id, &args.by).await?;
            print_json(&store.load_proposal(&proposal_id).await?)?;
        }
        Command::Reject { proposal_id } => {
            generator.reject_proposal(&proposal_id, &args.by).await?;
            print_json(&store.load_proposal(&proposal_id).await?)?;
        }
        Command::Apply { proposal_id } => {
            let result = applicator.apply_proposal(&proposal_id, &args.by).await;
            print_json(&result)?;
        }
        Command::ApplyBatch { strategy, max } => {
            let results = applicator
                .apply_approved_proposals(strategy.as_deref(), &args.by, max)
                .await?;
            print_json(&results)?;
            print_json(&BatchSummary::from_results(&results))?;
        }
        Command::Revert { change_id, reason } => {
            let result = applicator.revert_change(&change_id, &reason, &args.by).await;
            print_json(&result)?;
        }
        Command::Evaluate { change_id, start, end } => {
            let evaluation = applicator
                .evaluate_change_performance(&change_id, start, end)
                .await?;
            print_json(&evaluation)?;
        }
        Command::Changes { strategy, reverted, limit } => {
            let filter = ChangeFilter {
                strategy_id: strategy,
                is_reverted: reverted,
                limit: Some(limit),
            };
            let changes: Vec<_> = store
                .list_changes(&filter)
                .await?
                .into_iter()
                .map(|change| {
                    let sharpe_improvement = change.sharpe_improvement();
                    serde_json::json!({ "change": change, "sharpe_improvement": sharpe_improvement })
                })
                .collect();
            print_json(&changes)?;
        }
        Command::ShowConfig { strategy_id } => {
            print_json(&store.load_strategy_config(&strategy_id).await?)?;
        }
    }

    Ok(())
}
