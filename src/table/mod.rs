//! Batch tables read from spreadsheet exports.
//!
//! A batch table is a block of rows beneath a labels row. One labelled column names the
//! action for each row; every other column is a parameter for that action. Additional
//! columns may be added for metadata or comments; handlers ignore what they don't ask for.
//!
//! ```text
//!  1 | some text here, maybe a title
//!  2 | (could have content here)
//!  3 | (or even more content here)
//!  4 | action | sx   | sy   | sample     | comments          |   <-- blank column ends the table
//!  5 | close  |      |      |            | close the shutter |
//!  6 | image  | 0    | 0    | dark       | dark image        |
//!  7 | scan   | 5.1  | -3.2 | 4140 steel | heat 9172634      |
//!  8 |
//!  9 | ^^^ blank row ends the table ^^^
//! 10 | (could have content here)
//! ```
//!
//! A row whose action starts with `#` is a comment. Because the first blank row ends the
//! table, use a comment row to leave visual space inside a table.

pub mod extent;
pub mod sheet;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BatchError, BatchResult};
use crate::metadata::clean_text;
pub use extent::{find_table_extent, full_extent, BoundedRows, TableExtent};
pub use sheet::{CsvSheet, SheetSource};

/// Options controlling how a table is located and interpreted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableOptions {
    /// Zero-based sheet row holding the column labels (3 = spreadsheet row 4)
    #[serde(default = "default_labels_row")]
    pub labels_row: usize,
    /// Label of the column that selects the action (matched case-insensitively)
    #[serde(default = "default_action_column")]
    pub action_column: String,
    /// Ignore every cell outside the detected table
    #[serde(default = "default_ignore_extra")]
    pub ignore_extra: bool,
    /// Action prefix that marks a row as a comment
    #[serde(default = "default_comment_marker")]
    pub comment_marker: String,
    /// Field delimiter of the CSV export
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_labels_row() -> usize {
    3
}

fn default_action_column() -> String {
    "action".to_string()
}

fn default_ignore_extra() -> bool {
    true
}

fn default_comment_marker() -> String {
    "#".to_string()
}

fn default_delimiter() -> char {
    ','
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            labels_row: default_labels_row(),
            action_column: default_action_column(),
            ignore_extra: default_ignore_extra(),
            comment_marker: default_comment_marker(),
            delimiter: default_delimiter(),
        }
    }
}

impl TableOptions {
    /// Set the labels row
    pub fn with_labels_row(mut self, labels_row: usize) -> Self {
        self.labels_row = labels_row;
        self
    }

    /// Set the action column label
    pub fn with_action_column(mut self, label: &str) -> Self {
        self.action_column = label.to_string();
        self
    }

    /// Keep or drop content outside the detected table
    pub fn with_ignore_extra(mut self, ignore_extra: bool) -> Self {
        self.ignore_extra = ignore_extra;
        self
    }

    /// Validate option values
    pub fn validate(&self) -> Result<(), String> {
        if self.action_column.trim().is_empty() {
            return Err("action_column cannot be empty".to_string());
        }
        if self.comment_marker.trim().is_empty() {
            return Err("comment_marker cannot be empty".to_string());
        }
        if !self.delimiter.is_ascii() {
            return Err(format!(
                "delimiter '{}' must be a single ASCII character",
                self.delimiter
            ));
        }
        Ok(())
    }

    fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(b',')
    }
}

/// Value of one table cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Blank cell
    Empty,
    /// Finite numeric value
    Number(f64),
    /// Any other content, trimmed
    Text(String),
}

impl CellValue {
    /// Classify raw cell text
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return CellValue::Empty;
        }
        match text.parse::<f64>() {
            Ok(v) if v.is_finite() => CellValue::Number(v),
            Ok(v) if v.is_nan() => CellValue::Empty,
            _ => CellValue::Text(text.to_string()),
        }
    }

    /// True for blank cells
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Numeric value, if the cell holds one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if the cell holds text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON representation used in metadata and the journal
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Empty => serde_json::Value::Null,
            CellValue::Number(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered parameter fields of one row, keyed by column label
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowParameters {
    fields: Vec<(String, CellValue)>,
}

impl RowParameters {
    /// Build from `(label, value)` pairs
    pub fn new(fields: Vec<(String, CellValue)>) -> Self {
        Self { fields }
    }

    /// Build from raw text, classifying each cell
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(label, raw)| (label.to_string(), CellValue::parse(raw)))
                .collect(),
        )
    }

    /// Look up a field by label; falls back to a case-insensitive match
    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|(l, _)| l.eq_ignore_ascii_case(label))
            })
            .map(|(_, v)| v)
    }

    /// True if the label exists and its cell is not blank
    pub fn has(&self, label: &str) -> bool {
        self.get(label).is_some_and(|v| !v.is_empty())
    }

    /// Required numeric field
    pub fn number(&self, label: &str) -> BatchResult<f64> {
        self.optional_number(label)?
            .ok_or_else(|| BatchError::MissingParameter(label.to_string()))
    }

    /// Optional numeric field; blank or absent is `None`, text is an error
    pub fn optional_number(&self, label: &str) -> BatchResult<Option<f64>> {
        match self.get(label) {
            None | Some(CellValue::Empty) => Ok(None),
            Some(CellValue::Number(v)) => Ok(Some(*v)),
            Some(CellValue::Text(s)) => Err(BatchError::InvalidNumber {
                column: label.to_string(),
                value: s.clone(),
            }),
        }
    }

    /// Required non-negative whole number (point counts and the like)
    pub fn count(&self, label: &str) -> BatchResult<usize> {
        let value = self.number(label)?;
        if value < 0.0 || value.fract() != 0.0 || value > usize::MAX as f64 {
            return Err(BatchError::InvalidNumber {
                column: label.to_string(),
                value: value.to_string(),
            });
        }
        Ok(value as usize)
    }

    /// Required text field; numbers are rendered back to text
    pub fn text(&self, label: &str) -> BatchResult<String> {
        self.optional_text(label)
            .ok_or_else(|| BatchError::MissingParameter(label.to_string()))
    }

    /// Optional text field
    pub fn optional_text(&self, label: &str) -> Option<String> {
        match self.get(label) {
            None | Some(CellValue::Empty) => None,
            Some(v) => Some(v.to_string()),
        }
    }

    /// Iterate `(label, value)` in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(l, v)| (l.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the row has no parameter columns
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Non-blank fields rendered as text, for plan arguments and reports
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(l, v)| (l.to_string(), v.to_string()))
            .collect()
    }
}

/// One data row of a batch table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRow {
    /// Zero-based index within the table
    pub index: usize,
    /// One-based row number in the sheet
    pub sheet_row: usize,
    /// Action cell, trimmed but not case-folded
    pub action: String,
    /// Every field of the row in column order, action included
    pub fields: Vec<(String, CellValue)>,
    #[serde(skip)]
    action_col: usize,
}

impl BatchRow {
    /// Parameter fields: every field except the action column
    pub fn parameters(&self) -> RowParameters {
        RowParameters::new(
            self.fields
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != self.action_col)
                .map(|(_, f)| f.clone())
                .collect(),
        )
    }

    /// Row content as `label=value` pairs, for diagnostics
    pub fn raw_content(&self) -> String {
        self.fields
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(l, v)| format!("{l}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// True if the action cell starts with the comment marker
    pub fn is_comment(&self, marker: &str) -> bool {
        !marker.is_empty() && self.action.starts_with(marker)
    }
}

/// A batch table: labels plus the rows within the table's extent
#[derive(Debug, Clone, Serialize)]
pub struct BatchTable {
    /// Name of the resource the table came from
    pub source: Option<String>,
    /// Column labels in order
    pub labels: Vec<String>,
    /// Label of the action column as written in the sheet
    pub action_column: String,
    /// Region of the sheet the rows were read from
    pub extent: TableExtent,
    rows: Vec<BatchRow>,
}

impl BatchTable {
    /// Load a CSV export from disk
    pub fn load(path: impl AsRef<Path>, options: &TableOptions) -> BatchResult<Self> {
        let path = path.as_ref();
        let sheet = CsvSheet::from_path(path, options.delimiter_byte())?;
        let mut table = Self::from_sheet(&sheet, options)?;
        table.source = Some(path.display().to_string());
        info!(
            source = %path.display(),
            rows = table.len(),
            columns = table.labels.len(),
            "Loaded batch table"
        );
        Ok(table)
    }

    /// Build a table from any sheet
    pub fn from_sheet<S: SheetSource + ?Sized>(
        sheet: &S,
        options: &TableOptions,
    ) -> BatchResult<Self> {
        let extent = if options.ignore_extra {
            find_table_extent(sheet, options.labels_row)?
        } else {
            full_extent(sheet, options.labels_row)?
        };
        debug!(?extent, ignore_extra = options.ignore_extra, "Table extent");

        let labels: Vec<String> = (0..extent.columns)
            .map(|col| match sheet.cell(extent.labels_row, col).trim() {
                "" => format!("column_{col}"),
                label => label.to_string(),
            })
            .collect();

        // Labels become metadata keys through `clean_text`, so compare them in that form
        let mut seen = HashSet::new();
        for label in &labels {
            if !seen.insert(clean_text(label).to_lowercase()) {
                return Err(BatchError::DuplicateColumn(label.clone()));
            }
        }

        let wanted = options.action_column.trim();
        let action_col = labels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BatchError::MissingColumn(wanted.to_string()))?;

        let rows = BoundedRows::new(sheet, extent)
            .map(|(index, cells)| {
                let fields: Vec<(String, CellValue)> = labels
                    .iter()
                    .zip(cells)
                    .map(|(label, raw)| (label.clone(), CellValue::parse(raw)))
                    .collect();
                BatchRow {
                    index,
                    sheet_row: extent.sheet_row_number(index),
                    action: fields[action_col].1.to_string(),
                    fields,
                    action_col,
                }
            })
            .collect();

        Ok(Self {
            source: None,
            action_column: labels[action_col].clone(),
            labels,
            extent,
            rows,
        })
    }

    /// Attach a source name
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Rows in table order
    pub fn rows(&self) -> &[BatchRow] {
        &self.rows
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
