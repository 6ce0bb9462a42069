//! `odsync` operator CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use odsync_core::{consistency_checker, init_tracing, input, Pipeline, SyncConfig};
use odsync_model::EntityKind;
use odsync_search::{CheckRun, HttpSearchIndex};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "odsync", version, about = "Open data portal synchronization pipeline")]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration
    Config,
    /// Compare an entity snapshot with the search index for one kind
    Check {
        /// Entity kind, label (`datasets.Dataset`) or segment (`dataset`)
        #[arg(long)]
        kind: EntityKind,
        /// JSON array of entities
        #[arg(long)]
        snapshot: PathBuf,
        /// Ids per page, overrides `consistency.batch_size`
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Replay a change event log through the full pipeline
    Replay {
        /// JSON array of entities the events refer to
        #[arg(long)]
        snapshot: PathBuf,
        /// JSON lines, one change event per line
        #[arg(long)]
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = SyncConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging)?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Check {
            kind,
            snapshot,
            batch_size,
        } => {
            if let Some(batch_size) = batch_size {
                config.consistency.batch_size = batch_size;
                config.validate()?;
            }
            let store = Arc::new(input::load_snapshot(&snapshot)?);
            let index = Arc::new(HttpSearchIndex::new(config.search.index.clone())?);
            let checker = consistency_checker(&config, store, index);

            let interrupt = checker.interrupt_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.store(true, Ordering::SeqCst);
                }
            });

            let run = checker
                .check(kind)
                .await
                .with_context(|| format!("checking {kind}"))?;
            println!("{}", serde_json::to_string_pretty(run.report())?);
            match run {
                CheckRun::Completed(report) if report.is_consistent() => {}
                CheckRun::Completed(_) => std::process::exit(1),
                CheckRun::Interrupted(_) => {
                    eprintln!("interrupted; run again to resume from the checkpoint");
                    std::process::exit(2);
                }
            }
        }
        Command::Replay { snapshot, events } => {
            let store = Arc::new(input::load_snapshot(&snapshot)?);
            let events = input::read_event_log(&events)?;
            let pipeline = Pipeline::builder(config, store).build()?;

            for event in &events {
                let report = pipeline.publish(event);
                if !report.is_clean() {
                    tracing::warn!(entity = %event.entity(), failures = report.failures.len(), "event not fully routed");
                }
            }
            pipeline.shutdown().await;

            let summary = serde_json::json!({
                "events": events.len(),
                "stats": pipeline.stats(),
                "failures": pipeline.failures(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !pipeline.failures().is_empty() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
