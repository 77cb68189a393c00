//! Row dispatch.
//!
//! [`BatchDispatcher`] walks a [`BatchTable`] top to bottom. For every row it normalizes
//! the action cell, looks the action up in the [`ActionRegistry`], and awaits the handler
//! before touching the next row: later rows may rely on state left by earlier ones (a
//! motor moved by one row is where the next row starts).
//!
//! Outcomes are produced lazily through [`BatchRun::next`], one per row:
//!
//! - registered action: the handler runs and its result is returned unmodified
//! - unknown action: a warning naming the row is logged and the row is skipped
//! - comment row (action starts with the comment marker): skipped silently
//!
//! A failing handler stops the run under [`FailurePolicy::Abort`] (the default). Under
//! [`FailurePolicy::Continue`] the failure is reported and the next row runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::metadata::ExecutionMetadata;
use crate::registry::{normalize_action, ActionRegistry, ActionReport};
use crate::table::{BatchRow, BatchTable, RowParameters};

/// What to do with the rest of the batch when a handler fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop after the failing row
    #[default]
    Abort,
    /// Report the failure and run the next row
    Continue,
}

/// Result of processing one row
#[derive(Debug)]
pub enum RowOutcome {
    /// A handler ran; its result is passed through as returned
    Executed {
        /// Traceability record given to the handler
        metadata: ExecutionMetadata,
        /// Parameters given to the handler
        params: RowParameters,
        /// Handler result
        result: anyhow::Result<ActionReport>,
    },
    /// No handler is registered for the row's action
    Unhandled {
        /// Zero-based row index
        row_index: usize,
        /// One-based sheet row
        sheet_row: usize,
        /// Action cell as written
        action: String,
        /// Row content, for the report
        raw: String,
    },
    /// Comment row
    Skipped {
        /// Zero-based row index
        row_index: usize,
        /// One-based sheet row
        sheet_row: usize,
        /// Comment text
        comment: String,
    },
}

impl RowOutcome {
    /// Zero-based index of the row this outcome belongs to
    pub fn row_index(&self) -> usize {
        match self {
            RowOutcome::Executed { metadata, .. } => metadata.row_index,
            RowOutcome::Unhandled { row_index, .. } | RowOutcome::Skipped { row_index, .. } => {
                *row_index
            }
        }
    }

    /// True if a handler ran and returned an error
    pub fn is_failure(&self) -> bool {
        matches!(self, RowOutcome::Executed { result: Err(_), .. })
    }

    /// One-line console report for an unhandled row
    pub fn unhandled_report(&self) -> Option<String> {
        match self {
            RowOutcome::Unhandled {
                row_index,
                sheet_row,
                action,
                raw,
            } => Some(format!(
                "no handling for row {row_index} (sheet row {sheet_row}), action '{action}': {raw}"
            )),
            _ => None,
        }
    }
}

/// Counts for a finished (or aborted) run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Rows in the table
    pub total_rows: usize,
    /// Rows handed to a handler
    pub dispatched: usize,
    /// Dispatched rows whose handler failed
    pub failed: usize,
    /// Rows with no registered action
    pub unhandled: usize,
    /// Comment rows
    pub skipped: usize,
    /// Row index where the run stopped early
    pub aborted_at: Option<usize>,
}

impl BatchSummary {
    /// True if every dispatched row succeeded and the run was not cut short
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.aborted_at.is_none()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows: {} dispatched, {} failed, {} unhandled, {} skipped",
            self.total_rows, self.dispatched, self.failed, self.unhandled, self.skipped
        )?;
        if let Some(row) = self.aborted_at {
            write!(f, " (aborted at row {row})")?;
        }
        Ok(())
    }
}

/// Dispatches batch rows to registered handlers
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    registry: Arc<ActionRegistry>,
    policy: FailurePolicy,
    comment_marker: String,
    user_metadata: BTreeMap<String, String>,
}

impl BatchDispatcher {
    /// Dispatcher over a registry, aborting on the first handler failure
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            policy: FailurePolicy::default(),
            comment_marker: "#".to_string(),
            user_metadata: BTreeMap::new(),
        }
    }

    /// Set the failure policy
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the comment marker; an empty marker disables comment rows
    pub fn with_comment_marker(mut self, marker: &str) -> Self {
        self.comment_marker = marker.to_string();
        self
    }

    /// User metadata overlaid on every row's metadata
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.user_metadata = metadata;
        self
    }

    /// The registry used for lookups
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Start a lazy run over a table
    pub fn run<'a>(&'a self, table: &'a BatchTable) -> BatchRun<'a> {
        info!(
            rows = table.len(),
            source = table.source.as_deref().unwrap_or("<memory>"),
            policy = ?self.policy,
            "Starting batch"
        );
        BatchRun {
            dispatcher: self,
            table,
            position: 0,
            halted: false,
            summary: BatchSummary {
                total_rows: table.len(),
                ..Default::default()
            },
        }
    }

    async fn dispatch(&self, row: &BatchRow, source: Option<&str>) -> RowOutcome {
        if row.is_comment(&self.comment_marker) {
            debug!(row = row.index, comment = %row.action, "Comment row");
            return RowOutcome::Skipped {
                row_index: row.index,
                sheet_row: row.sheet_row,
                comment: row.action.clone(),
            };
        }

        let action = normalize_action(&row.action);
        let Some(handler) = self.registry.get(&action) else {
            let raw = row.raw_content();
            warn!(
                row = row.index,
                sheet_row = row.sheet_row,
                action = %row.action,
                content = %raw,
                "No handler for action, row skipped"
            );
            return RowOutcome::Unhandled {
                row_index: row.index,
                sheet_row: row.sheet_row,
                action: row.action.clone(),
                raw,
            };
        };

        let metadata = ExecutionMetadata::from_row(row, &action, source, &self.user_metadata);
        let params = row.parameters();
        let span = info_span!("row", index = row.index, sheet_row = row.sheet_row, action = %action);
        let result = handler
            .execute(&params, &metadata)
            .instrument(span)
            .await;

        match &result {
            Ok(report) => debug!(row = row.index, summary = %report.summary, "Row succeeded"),
            Err(e) => error!(row = row.index, action = %action, error = %e, "Row failed"),
        }

        RowOutcome::Executed {
            metadata,
            params,
            result,
        }
    }
}

/// A run in progress; yields one outcome per row in table order
#[derive(Debug)]
pub struct BatchRun<'a> {
    dispatcher: &'a BatchDispatcher,
    table: &'a BatchTable,
    position: usize,
    halted: bool,
    summary: BatchSummary,
}

impl<'a> BatchRun<'a> {
    /// Process the next row
    ///
    /// Returns `None` when the table is exhausted or the run was aborted.
    pub async fn next(&mut self) -> Option<RowOutcome> {
        if self.halted {
            return None;
        }
        let row = self.table.rows().get(self.position)?;
        self.position += 1;

        let outcome = self
            .dispatcher
            .dispatch(row, self.table.source.as_deref())
            .await;

        match &outcome {
            RowOutcome::Executed { result, .. } => {
                self.summary.dispatched += 1;
                if result.is_err() {
                    self.summary.failed += 1;
                    if self.dispatcher.policy == FailurePolicy::Abort {
                        warn!(row = row.index, "Aborting batch after failed row");
                        self.summary.aborted_at = Some(row.index);
                        self.halted = true;
                    }
                }
            }
            RowOutcome::Unhandled { .. } => self.summary.unhandled += 1,
            RowOutcome::Skipped { .. } => self.summary.skipped += 1,
        }

        Some(outcome)
    }

    /// Counts so far
    pub fn summary(&self) -> &BatchSummary {
        &self.summary
    }

    /// Run the remaining rows and return the final counts
    pub async fn finish(mut self) -> BatchSummary {
        while self.next().await.is_some() {}
        info!(summary = %self.summary, "Batch finished");
        self.summary
    }
}
