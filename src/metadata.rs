//! Execution metadata attached to every dispatched row.
//!
//! Metadata exists for traceability: it records where an action came from (file, row,
//! original cell values) so the resulting data can be matched back to the batch table.
//! The dispatcher never consults it when deciding what to run.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{BatchError, BatchResult};
use crate::table::BatchRow;

static KEY_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("Invalid metadata key regex"));

/// Convert text so it can be used as a metadata key
///
/// Every character outside `[a-zA-Z0-9_]` becomes `_`.
pub fn clean_text(text: &str) -> String {
    KEY_CHARS.replace_all(text, "_").into_owned()
}

/// Parse a metadata spec such as `"purpose=just tuned, situation=routine"`
pub fn parse_metadata_spec(spec: &str) -> BatchResult<BTreeMap<String, String>> {
    let mut md = BTreeMap::new();
    for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = item.split_once('=').ok_or_else(|| {
            BatchError::Configuration(format!("metadata item '{item}' is not key=value"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(BatchError::Configuration(format!(
                "metadata item '{item}' has an empty key"
            )));
        }
        md.insert(key.to_string(), value.trim().to_string());
    }
    Ok(md)
}

/// Traceability record for one dispatched row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionMetadata {
    /// Zero-based row index within the table
    pub row_index: usize,
    /// One-based row number in the sheet
    pub sheet_row: usize,
    /// Normalized action name
    pub action: String,
    /// File the table was read from
    pub source: Option<String>,
    /// Every original field of the row, keyed by cleaned label
    pub fields: BTreeMap<String, Value>,
    /// User-supplied metadata, overlaid last
    pub user: BTreeMap<String, String>,
}

impl ExecutionMetadata {
    /// Capture metadata for a table row
    pub fn from_row(
        row: &BatchRow,
        action: &str,
        source: Option<&str>,
        user: &BTreeMap<String, String>,
    ) -> Self {
        let mut builder = MetadataBuilder::new()
            .row(row.index, row.sheet_row)
            .action(action);
        if let Some(source) = source {
            builder = builder.source(source);
        }
        for (label, value) in &row.fields {
            builder = builder.field(label, value.to_json());
        }
        for (key, value) in user {
            builder = builder.user(key, value);
        }
        builder.build()
    }

    /// Flatten into a single key/value map
    ///
    /// Row fields come first, then the provenance keys (`action`, `row_index`,
    /// `sheet_row`, `source_file`), then user metadata, which wins on collisions.
    pub fn flatten(&self) -> BTreeMap<String, Value> {
        let mut md = self.fields.clone();
        md.insert("action".to_string(), Value::from(self.action.clone()));
        md.insert("row_index".to_string(), Value::from(self.row_index));
        md.insert("sheet_row".to_string(), Value::from(self.sheet_row));
        if let Some(source) = &self.source {
            md.insert("source_file".to_string(), Value::from(source.clone()));
        }
        for (k, v) in &self.user {
            md.insert(k.clone(), Value::from(v.clone()));
        }
        md
    }

    /// Flattened metadata rendered as strings, for plan start metadata
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.flatten()
            .into_iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect()
    }
}

/// A builder for constructing `ExecutionMetadata` instances.
#[derive(Debug, Default)]
pub struct MetadataBuilder {
    row_index: usize,
    sheet_row: usize,
    action: String,
    source: Option<String>,
    fields: BTreeMap<String, Value>,
    user: BTreeMap<String, String>,
}

impl MetadataBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Row position
    pub fn row(mut self, row_index: usize, sheet_row: usize) -> Self {
        self.row_index = row_index;
        self.sheet_row = sheet_row;
        self
    }

    /// Normalized action name
    pub fn action(mut self, action: &str) -> Self {
        self.action = action.to_string();
        self
    }

    /// Source file name
    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// One original field; the label is cleaned into a key
    pub fn field(mut self, label: &str, value: Value) -> Self {
        self.fields.insert(clean_text(label), value);
        self
    }

    /// One user metadata entry
    pub fn user(mut self, key: &str, value: &str) -> Self {
        self.user.insert(key.to_string(), value.to_string());
        self
    }

    /// Finish
    pub fn build(self) -> ExecutionMetadata {
        ExecutionMetadata {
            row_index: self.row_index,
            sheet_row: self.sheet_row,
            action: self.action,
            source: self.source,
            fields: self.fields,
            user: self.user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("Scan Type"), "Scan_Type");
        assert_eq!(clean_text("T (°C)"), "T___C_");
        assert_eq!(clean_text("already_ok_42"), "already_ok_42");
    }

    #[test]
    fn test_parse_metadata_spec() {
        let md = parse_metadata_spec("purpose=just tuned, situation = routine,").unwrap();
        assert_eq!(md.get("purpose").map(String::as_str), Some("just tuned"));
        assert_eq!(md.get("situation").map(String::as_str), Some("routine"));
        assert!(parse_metadata_spec("").unwrap().is_empty());
        assert!(parse_metadata_spec("novalue").is_err());
        assert!(parse_metadata_spec("=x").is_err());
    }

    #[test]
    fn test_user_metadata_overlays_fields() {
        let md = MetadataBuilder::new()
            .row(2, 7)
            .action("scan")
            .source("plan.csv")
            .field("Sample Name", Value::from("steel"))
            .field("purpose", Value::from("from table"))
            .user("purpose", "from user")
            .build();

        let flat = md.flatten();
        assert_eq!(flat["Sample_Name"], Value::from("steel"));
        assert_eq!(flat["purpose"], Value::from("from user"));
        assert_eq!(flat["sheet_row"], Value::from(7));
        assert_eq!(flat["source_file"], Value::from("plan.csv"));

        let strings = md.to_string_map();
        assert_eq!(strings["row_index"], "2");
        assert_eq!(strings["action"], "scan");
    }
}
