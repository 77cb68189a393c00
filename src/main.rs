//! CLI Entry Point for daq-batch
//!
//! Provides command-line interface for:
//! - Running a batch table (one action per row)
//! - Inspecting how a table will be read before running it
//! - Listing the available actions
//! - Printing the execution history
//!
//! # Usage
//!
//! ```bash
//! daq-batch run plan.csv -m "purpose=alignment, operator=jb"
//! daq-batch inspect plan.csv --labels-row 0
//! daq-batch history -n 10
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use daq_batch::actions::standard_registry;
use daq_batch::config::{BatchConfig, SimulationConfig, DEFAULT_CONFIG_PATH};
use daq_batch::dispatcher::{BatchDispatcher, FailurePolicy, RowOutcome};
use daq_batch::executor::SimulatedExecutor;
use daq_batch::journal::{ExecutionRecord, Journal};
use daq_batch::metadata::parse_metadata_spec;
use daq_batch::report::{batch_table, history_table, RestTable};
use daq_batch::table::{BatchTable, TableOptions};
use daq_batch::tracing_setup::{self, OutputFormat, TracingConfig};

#[derive(Parser)]
#[command(name = "daq-batch")]
#[command(about = "Run batch plans described by spreadsheet tables", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch every row of a batch table
    Run {
        /// CSV export of the batch table
        table: PathBuf,

        #[command(flatten)]
        layout: TableArgs,

        /// Keep going after a row fails
        #[arg(long)]
        keep_going: bool,

        /// Do not record executed rows in the journal
        #[arg(long)]
        no_journal: bool,

        /// Metadata for every row, e.g. "purpose=alignment, operator=jb"
        #[arg(short = 'm', long)]
        metadata: Option<String>,
    },

    /// Show how a table will be read, without running it
    Inspect {
        /// CSV export of the batch table
        table: PathBuf,

        #[command(flatten)]
        layout: TableArgs,
    },

    /// List registered actions
    Actions,

    /// Summarize recent executions
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },

    /// Print the effective configuration
    Config,
}

#[derive(clap::Args)]
struct TableArgs {
    /// Zero-based row holding the column labels
    #[arg(long)]
    labels_row: Option<usize>,

    /// Label of the action column
    #[arg(long)]
    action_column: Option<String>,

    /// Read the whole sheet instead of stopping at the first blank row and column
    #[arg(long)]
    include_extra: bool,
}

impl TableArgs {
    fn apply(&self, base: &TableOptions) -> Result<TableOptions> {
        let mut options = base.clone();
        if let Some(row) = self.labels_row {
            options = options.with_labels_row(row);
        }
        if let Some(column) = &self.action_column {
            options = options.with_action_column(column);
        }
        if self.include_extra {
            options = options.with_ignore_extra(false);
        }
        options.validate().map_err(anyhow::Error::msg)?;
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = BatchConfig::load_from(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let mut tracing_config =
        TracingConfig::from_batch_config(&config).map_err(anyhow::Error::msg)?;
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(format);
    }
    tracing_setup::init(tracing_config).map_err(anyhow::Error::msg)?;
    debug!(config = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Run {
            table,
            layout,
            keep_going,
            no_journal,
            metadata,
        } => {
            let options = layout.apply(&config.table)?;
            run_batch(&config, table, options, keep_going, no_journal, metadata).await
        }
        Commands::Inspect { table, layout } => {
            let options = layout.apply(&config.table)?;
            inspect_table(table, &options)
        }
        Commands::Actions => list_actions(&config),
        Commands::History { count } => show_history(&config, count),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn simulated_executor(config: &SimulationConfig) -> SimulatedExecutor {
    SimulatedExecutor::new()
        .with_devices(config.devices.iter().cloned())
        .with_waits(config.honor_waits)
}

async fn run_batch(
    config: &BatchConfig,
    table_path: PathBuf,
    options: TableOptions,
    keep_going: bool,
    no_journal: bool,
    metadata: Option<String>,
) -> Result<()> {
    let table = BatchTable::load(&table_path, &options)
        .with_context(|| format!("reading batch table {}", table_path.display()))?;

    let mut user_metadata = config.dispatch.metadata.clone();
    if let Some(spec) = metadata {
        user_metadata.extend(parse_metadata_spec(&spec)?);
    }

    let policy = if keep_going {
        FailurePolicy::Continue
    } else {
        config.dispatch.failure_policy
    };

    let registry = standard_registry(Arc::new(simulated_executor(&config.simulation)));
    let dispatcher = BatchDispatcher::new(Arc::new(registry))
        .with_policy(policy)
        .with_comment_marker(&options.comment_marker)
        .with_metadata(user_metadata);

    let journal = (config.journal.enabled && !no_journal)
        .then(|| Journal::new(config.journal.resolved_path()));
    let mut next_id = match &journal {
        Some(journal) => journal.next_id()?,
        None => 1,
    };
    if let Some(journal) = &journal {
        info!(path = %journal.path().display(), "Recording executions");
    }

    let mut first_failure = None;
    let mut run = dispatcher.run(&table);
    while let Some(outcome) = run.next().await {
        if let Some(line) = outcome.unhandled_report() {
            println!("{line}");
        }

        if let Some(journal) = &journal {
            if let Some(record) = ExecutionRecord::from_outcome(&outcome, next_id) {
                journal.append(&record)?;
                next_id += 1;
            }
        }

        if let RowOutcome::Executed {
            metadata, result, ..
        } = outcome
        {
            match result {
                Ok(report) => println!(
                    "row {} {}: {}",
                    metadata.sheet_row, metadata.action, report.summary
                ),
                Err(e) => {
                    eprintln!("row {} {} failed: {e:#}", metadata.sheet_row, metadata.action);
                    if first_failure.is_none() {
                        first_failure = Some(e.context(format!(
                            "sheet row {} ({}) failed",
                            metadata.sheet_row, metadata.action
                        )));
                    }
                }
            }
        }
    }

    let summary = run.finish().await;
    println!("{summary}");

    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn inspect_table(table_path: PathBuf, options: &TableOptions) -> Result<()> {
    let table = BatchTable::load(&table_path, options)
        .with_context(|| format!("reading batch table {}", table_path.display()))?;

    println!(
        "{}: labels on sheet row {}, {} columns, {} rows, action column '{}'",
        table_path.display(),
        table.extent.labels_row + 1,
        table.labels.len(),
        table.len(),
        table.action_column
    );
    print!("{}", batch_table(&table));
    Ok(())
}

fn list_actions(config: &BatchConfig) -> Result<()> {
    let registry = standard_registry(Arc::new(simulated_executor(&config.simulation)));
    let mut report = RestTable::with_labels(["action", "description"]);
    for (name, description) in registry.list_actions() {
        report.add_row([name, description]);
    }
    print!("{report}");
    Ok(())
}

fn show_history(config: &BatchConfig, count: usize) -> Result<()> {
    let journal = Journal::new(config.journal.resolved_path());
    let records = journal.recent(count)?;
    if records.is_empty() {
        println!("No executions recorded in {}", journal.path().display());
        return Ok(());
    }
    print!("{}", history_table(&records));
    Ok(())
}
