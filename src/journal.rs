//! Append-only record of dispatched rows.
//!
//! Every executed row becomes one JSON line. The `history` command reads the journal back
//! to list what ran, so a user can find the run produced by a given table row.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatcher::RowOutcome;
use crate::error::BatchResult;

/// Journal entry for one executed row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    /// Sequential id within the journal
    pub id: u64,
    /// Run identifier reported by the handler, or a fresh one
    pub uid: String,
    /// When the row finished
    pub time: DateTime<Utc>,
    /// Normalized action name
    pub plan: String,
    /// Non-blank parameter fields
    pub args: BTreeMap<String, String>,
    /// One-based sheet row
    pub row_number: usize,
    /// Table file
    #[serde(default)]
    pub source: Option<String>,
    /// `success` or `fail`
    pub exit_status: String,
    /// Failure message, empty on success
    #[serde(default)]
    pub reason: String,
    /// Host the batch ran on
    #[serde(default)]
    pub host: Option<String>,
}

impl ExecutionRecord {
    /// Record for an executed row; `None` for unhandled and comment rows
    pub fn from_outcome(outcome: &RowOutcome, id: u64) -> Option<Self> {
        let RowOutcome::Executed {
            metadata,
            params,
            result,
        } = outcome
        else {
            return None;
        };

        let (uid, exit_status, reason) = match result {
            Ok(report) => (report.run_uid.clone(), "success", String::new()),
            Err(e) => (None, "fail", format!("{e:#}")),
        };

        Some(Self {
            id,
            uid: uid.unwrap_or_else(|| Uuid::new_v4().to_string()),
            time: Utc::now(),
            plan: metadata.action.clone(),
            args: params.to_string_map(),
            row_number: metadata.sheet_row,
            source: metadata.source.clone(),
            exit_status: exit_status.to_string(),
            reason,
            host: current_host(),
        })
    }

    /// True if the row succeeded
    pub fn succeeded(&self) -> bool {
        self.exit_status == "success"
    }
}

fn current_host() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

/// Default journal location
pub fn default_journal_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daq-batch")
        .join("journal.jsonl")
}

/// JSON-lines journal file
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Journal at a path; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&self, record: &ExecutionRecord) -> BatchResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        debug!(id = record.id, uid = %record.uid, path = %self.path.display(), "Journal entry written");
        Ok(())
    }

    /// Every record, oldest first; a missing file is an empty journal
    ///
    /// Lines that fail to parse are logged and skipped.
    pub fn read_all(&self) -> BatchResult<Vec<ExecutionRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = number + 1, error = %e, "Skipping unreadable journal line"),
            }
        }
        Ok(records)
    }

    /// The last `n` records, oldest first
    pub fn recent(&self, n: usize) -> BatchResult<Vec<ExecutionRecord>> {
        let mut records = self.read_all()?;
        let skip = records.len().saturating_sub(n);
        records.drain(..skip);
        Ok(records)
    }

    /// Id to use for the next record
    pub fn next_id(&self) -> BatchResult<u64> {
        Ok(self
            .read_all()?
            .iter()
            .map(|r| r.id)
            .max()
            .map_or(1, |id| id + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataBuilder;
    use crate::registry::ActionReport;
    use crate::table::RowParameters;
    use tempfile::TempDir;

    fn executed(result: anyhow::Result<ActionReport>) -> RowOutcome {
        RowOutcome::Executed {
            metadata: MetadataBuilder::new()
                .row(0, 5)
                .action("count")
                .source("plan.csv")
                .build(),
            params: RowParameters::from_pairs([("num", "3"), ("detector", "I0"), ("note", "")]),
            result,
        }
    }

    #[test]
    fn test_record_from_outcome() {
        let ok = executed(Ok(ActionReport::message("done").with_run("abc-123", 3)));
        let record = ExecutionRecord::from_outcome(&ok, 7).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.uid, "abc-123");
        assert_eq!(record.plan, "count");
        assert_eq!(record.row_number, 5);
        assert_eq!(record.args.len(), 2);
        assert!(record.succeeded());

        let failed = executed(Err(anyhow::anyhow!("detector offline")));
        let record = ExecutionRecord::from_outcome(&failed, 8).unwrap();
        assert_eq!(record.exit_status, "fail");
        assert_eq!(record.reason, "detector offline");

        let skipped = RowOutcome::Skipped {
            row_index: 1,
            sheet_row: 6,
            comment: "#".to_string(),
        };
        assert!(ExecutionRecord::from_outcome(&skipped, 9).is_none());
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::new(dir.path().join("none.jsonl"));
        assert!(journal.read_all().unwrap().is_empty());
        assert_eq!(journal.next_id().unwrap(), 1);
    }
}
