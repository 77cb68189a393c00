//! reStructuredText "simple table" rendering for console reports.
//!
//! ```text
//! =================== ========= == ========= ====================
//! date/time           short_uid id plan      args
//! =================== ========= == ========= ====================
//! 2026-03-02 10:14:07 5f2e8c1a  1  step_scan motor=m1, num=5
//! =================== ========= == ========= ====================
//! ```

use std::fmt;

use crate::journal::ExecutionRecord;
use crate::table::BatchTable;

/// Simple reStructuredText table
#[derive(Debug, Clone, Default)]
pub struct RestTable {
    labels: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RestTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the given column labels
    pub fn with_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a column label
    pub fn add_label(&mut self, label: impl Into<String>) {
        self.labels.push(label.into());
    }

    /// Append a row; missing cells render blank, extra cells are dropped
    pub fn add_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells
            .into_iter()
            .map(|c| c.into().replace('\n', " "))
            .take(self.labels.len())
            .collect();
        row.resize(self.labels.len(), String::new());
        self.rows.push(row);
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if there are no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                self.rows
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(label.chars().count()))
                    .max()
                    .unwrap_or(0)
                    .max(1)
            })
            .collect()
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(f, "{}", line.trim_end())
}

impl fmt::Display for RestTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return Ok(());
        }
        let widths = self.widths();
        let border: Vec<String> = widths.iter().map(|w| "=".repeat(*w)).collect();

        write_line(f, &border, &widths)?;
        write_line(f, &self.labels, &widths)?;
        write_line(f, &border, &widths)?;
        for row in &self.rows {
            write_line(f, row, &widths)?;
        }
        write_line(f, &border, &widths)
    }
}

/// First group of a uuid
pub fn short_uid(uid: &str) -> &str {
    uid.split('-').next().unwrap_or(uid)
}

/// Summary table of journal records, oldest first
pub fn history_table(records: &[ExecutionRecord]) -> RestTable {
    let mut table = RestTable::with_labels(["date/time", "short_uid", "id", "plan", "args"]);
    for record in records {
        let args = record
            .args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row([
            record.time.format("%Y-%m-%d %H:%M:%S").to_string(),
            short_uid(&record.uid).to_string(),
            record.id.to_string(),
            record.plan.clone(),
            args,
        ]);
    }
    table
}

/// Rows of a batch table, prefixed with their sheet row numbers
pub fn batch_table(table: &BatchTable) -> RestTable {
    let mut report = RestTable::new();
    report.add_label("row");
    for label in &table.labels {
        report.add_label(label.clone());
    }
    for row in table.rows() {
        report.add_row(
            std::iter::once(row.sheet_row.to_string())
                .chain(row.fields.iter().map(|(_, v)| v.to_string())),
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_table() {
        let mut table = RestTable::with_labels(["plan", "args"]);
        table.add_row(["count", "num=3"]);
        table.add_row(["mv", ""]);

        let expected = "\
===== =====
plan  args
===== =====
count num=3
mv
===== =====
";
        assert_eq!(table.to_string(), expected);
    }

    #[test]
    fn test_row_is_fitted_to_labels() {
        let mut table = RestTable::with_labels(["a", "b"]);
        table.add_row(["1"]);
        table.add_row(["1", "2", "3"]);
        assert_eq!(table.len(), 2);
        assert!(table.to_string().contains("1 2\n"));
    }

    #[test]
    fn test_short_uid() {
        assert_eq!(short_uid("5f2e8c1a-0b7d-4f7e-9a61-3c1d2e4f5a6b"), "5f2e8c1a");
        assert_eq!(short_uid("plain"), "plain");
    }
}
