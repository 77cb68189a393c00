//! # DAQ Batch Library
//!
//! Spreadsheet-driven batch plans. A batch is a table exported from a spreadsheet: one
//! labelled column names an action for each row, the remaining columns carry that action's
//! parameters. The dispatcher walks the table top to bottom, runs a registered handler for
//! every recognized action, attaches traceability metadata, and reports rows it could not
//! handle.
//!
//! ## Crate Structure
//!
//! - **`table`**: Reads the sheet, finds the labelled table region, and never touches cells
//!   outside it. See `table::BatchTable`.
//! - **`registry`**: The `ActionHandler` trait and the `ActionRegistry` that maps normalized
//!   action names to handlers.
//! - **`dispatcher`**: `BatchDispatcher` and the lazy `BatchRun`, one `RowOutcome` per row.
//! - **`metadata`**: `ExecutionMetadata` attached to every dispatched row.
//! - **`plans`**: Plans as command streams, and builders that turn rows into plans.
//! - **`executor`**: The seam to the scan engine, with a simulated engine for dry runs.
//! - **`actions`**: Built-in actions (`step_scan`, `count`, `mv`).
//! - **`journal`** / **`report`**: Execution history and reStructuredText reports.
//! - **`config`** / **`tracing_setup`** / **`error`**: Ambient infrastructure.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use daq_batch::{
//!     actions::standard_registry, dispatcher::BatchDispatcher, executor::SimulatedExecutor,
//!     table::{BatchTable, TableOptions},
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let table = BatchTable::load("plan.csv", &TableOptions::default())?;
//! let registry = standard_registry(Arc::new(SimulatedExecutor::new()));
//! let dispatcher = BatchDispatcher::new(Arc::new(registry));
//!
//! let mut run = dispatcher.run(&table);
//! while let Some(outcome) = run.next().await {
//!     if let Some(line) = outcome.unhandled_report() {
//!         println!("{line}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod journal;
pub mod metadata;
pub mod plans;
pub mod registry;
pub mod report;
pub mod table;
pub mod tracing_setup;
