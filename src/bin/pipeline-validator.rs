//! # Pipeline Validator
//!
//! Command-line tool for checking a pipeline configuration and the DAG built
//! from it before a host schedules any runs.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use songplay_pipeline::config::ConfigManager;
use songplay_pipeline::dag::sparkify::quality_checks;
use songplay_pipeline::dag::{build_pipeline, LocalRunner};
use songplay_pipeline::logging::init_structured_logging_with_level;
use songplay_pipeline::tasks::{Assertion, Task};
use songplay_pipeline::warehouse::{ConnectionRegistry, PostgresHook, RecordingWarehouse};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pipeline-validator")]
#[command(about = "Validate the songplay pipeline configuration and DAG")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, env = "SONGPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the configuration and build the DAG
    Validate,

    /// Print tasks in topological order with their upstreams
    Order,

    /// Print the DAG as a Mermaid flowchart
    Mermaid,

    /// List logical dates due by now according to the schedule
    Due,

    /// Execute one run
    Run {
        /// Logical date of the run (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Record statements instead of connecting to the warehouse
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    init_structured_logging_with_level(Some(level));

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Order) => print_order(&cli),
        Some(Commands::Mermaid) => print_mermaid(&cli),
        Some(Commands::Due) => print_due(&cli),
        Some(Commands::Run { date, dry_run }) => run_once(&cli, *date, *dry_run).await,
    };

    if let Err(e) = result {
        error!("Pipeline validation failed: {e:#}");
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<Arc<ConfigManager>> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigManager::load().context("loading configuration from environment")?,
    };
    Ok(manager)
}

fn validate(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    println!("✅ Configuration loaded");
    if let Some(path) = manager.source_path() {
        println!("   source: {}", path.display());
    }

    let dag = build_pipeline(manager.config()).context("building pipeline")?;
    println!(
        "✅ DAG '{}' is valid: {} tasks, {} edges",
        dag.dag_id(),
        dag.len(),
        dag.edge_count()
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&manager.debug_config()).context("rendering configuration")?
    );
    Ok(())
}

fn print_order(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let dag = build_pipeline(manager.config())?;

    for (position, task_id) in dag.topological_order().iter().enumerate() {
        let kind = dag.task(task_id).map(|t| t.kind().to_string()).unwrap_or_default();
        let upstream = dag.upstream(task_id);
        if upstream.is_empty() {
            println!("{:>2}. {task_id} [{kind}]", position + 1);
        } else {
            println!("{:>2}. {task_id} [{kind}] <- {}", position + 1, upstream.join(", "));
        }
    }
    Ok(())
}

fn print_mermaid(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let dag = build_pipeline(manager.config())?;
    print!("{}", dag.to_mermaid());
    Ok(())
}

fn print_due(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let dag = &manager.config().dag;
    let due = dag
        .schedule_interval
        .due_logical_dates(dag.start_date, Utc::now(), dag.catchup);

    println!(
        "📅 {} ({}, catchup: {}): {} due",
        dag.dag_id,
        dag.schedule_interval,
        dag.catchup,
        due.len()
    );
    for logical_date in due {
        println!("   {}", logical_date.to_rfc3339());
    }
    Ok(())
}

/// Recording hook whose probes satisfy every pipeline quality check
fn dry_run_warehouse() -> Result<RecordingWarehouse> {
    let mut warehouse = RecordingWarehouse::new();
    for check in quality_checks() {
        if let Assertion::NoNulls { .. } = check.assertion {
            warehouse = warehouse.with_scalar(check.assertion.probe_sql(&check.table)?, 0);
        }
    }
    Ok(warehouse)
}

async fn run_once(cli: &Cli, date: Option<NaiveDate>, dry_run: bool) -> Result<()> {
    let manager = load(cli)?;
    let config = manager.config();
    let dag = Arc::new(build_pipeline(config)?);

    let connections = ConnectionRegistry::new();
    if dry_run {
        connections.register(
            config.warehouse.connection_id.clone(),
            Arc::new(dry_run_warehouse()?),
        );
    } else {
        let hook = PostgresHook::connect(&config.warehouse)
            .await
            .context("connecting to warehouse")?;
        connections.register(config.warehouse.connection_id.clone(), Arc::new(hook));
    }

    let logical_date: DateTime<Utc> = match date {
        Some(date) => Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)),
        None => Utc::now(),
    };

    info!(dry_run, logical_date = %logical_date, "Starting run");
    let report = LocalRunner::new(dag, config.retry_policy(), connections)
        .run(logical_date)
        .await?;

    for task in &report.tasks {
        match &task.error {
            Some(error) => println!(
                "{:<28} {:<16} attempts={} {error}",
                task.task_id,
                task.state.to_string(),
                task.attempts
            ),
            None => println!(
                "{:<28} {:<16} attempts={}",
                task.task_id,
                task.state.to_string(),
                task.attempts
            ),
        }
    }

    if report.is_success() {
        println!("🎉 Run {} succeeded", report.run_id);
        Ok(())
    } else {
        anyhow::bail!("run {} finished as {}", report.run_id, report.state)
    }
}
