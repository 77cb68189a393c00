//! Table bounding: content outside the labelled region is never read.

use std::cell::RefCell;
use std::io::Write;

use daq_batch::error::BatchError;
use daq_batch::table::{
    find_table_extent, BatchTable, BoundedRows, CsvSheet, SheetSource, TableOptions,
};
use tempfile::NamedTempFile;

/// Sheet that logs every cell coordinate it is asked for
struct RecordingSheet {
    inner: CsvSheet,
    reads: RefCell<Vec<(usize, usize)>>,
}

impl RecordingSheet {
    fn new(text: &str) -> Self {
        Self {
            inner: CsvSheet::from_reader(text.as_bytes(), b',').unwrap(),
            reads: RefCell::new(Vec::new()),
        }
    }

    fn take_reads(&self) -> Vec<(usize, usize)> {
        self.reads.take()
    }
}

impl SheetSource for RecordingSheet {
    fn rows(&self) -> usize {
        self.inner.rows()
    }

    fn columns(&self) -> usize {
        self.inner.columns()
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.reads.borrow_mut().push((row, col));
        self.inner.cell(row, col)
    }
}

// Title rows, a 3x3 table with a blank label column after it, a blank row, then junk.
const SHEET: &str = "\
Batch for 2026-03 beamtime,,,,
,,,,
,,,,
action,motor,position,,scratch
mv,sx,1.0,,999
mv,sy,2.5,,not a number
count,,,,
,,,,
garbage,below,the,table,!!
";

#[test]
fn test_extent_stops_at_blank_label_and_blank_row() {
    let sheet = RecordingSheet::new(SHEET);
    let extent = find_table_extent(&sheet, 3).unwrap();
    assert_eq!(extent.labels_row, 3);
    assert_eq!(extent.columns, 3);
    assert_eq!(extent.rows, 3);
    assert_eq!(extent.sheet_row_number(0), 5);
}

#[test]
fn test_bounded_rows_never_leave_the_extent() {
    let sheet = RecordingSheet::new(SHEET);
    let extent = find_table_extent(&sheet, 3).unwrap();
    sheet.take_reads();

    let rows: Vec<_> = BoundedRows::new(&sheet, extent).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].1, vec!["mv", "sy", "2.5"]);

    let reads = sheet.take_reads();
    assert_eq!(reads.len(), 9);
    for (row, col) in reads {
        assert!(
            extent.contains(row, col),
            "read ({row}, {col}) outside {extent:?}"
        );
    }
}

#[test]
fn test_loading_never_reads_right_of_or_below_the_table() {
    let sheet = RecordingSheet::new(SHEET);
    let table = BatchTable::from_sheet(&sheet, &TableOptions::default()).unwrap();
    assert_eq!(table.labels, vec!["action", "motor", "position"]);
    assert_eq!(table.len(), 3);

    for (row, col) in sheet.take_reads() {
        assert!(row >= 3, "read title row {row}");
        // the first blank row terminates the table; nothing after it is touched
        assert!(row <= 7, "read ({row}, {col}) below the table");
        if row == 3 {
            // column detection stops at the first blank label
            assert!(col <= 3, "read label ({row}, {col})");
        } else {
            assert!(col < 3, "read ({row}, {col}) right of the table");
        }
    }
}

#[test]
fn test_stray_content_reaches_rows_when_not_ignored() {
    let sheet = CsvSheet::from_reader(SHEET.as_bytes(), b',').unwrap();
    let options = TableOptions::default().with_ignore_extra(false);
    let table = BatchTable::from_sheet(&sheet, &options).unwrap();

    assert_eq!(
        table.labels,
        vec!["action", "motor", "position", "column_3", "scratch"]
    );
    assert_eq!(table.len(), 5);

    let params = table.rows()[1].parameters();
    let err = params.number("scratch").unwrap_err();
    assert!(matches!(err, BatchError::InvalidNumber { .. }));
    assert!(err.to_string().contains("not a number"));
}

#[test]
fn test_load_from_csv_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{SHEET}").unwrap();

    let table = BatchTable::load(file.path(), &TableOptions::default()).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.rows()[2].action, "count");
    assert_eq!(table.rows()[2].sheet_row, 7);
    assert!(table.source.is_some());
}

#[test]
fn test_labels_row_past_end() {
    let sheet = CsvSheet::from_reader("action\nmv\n".as_bytes(), b',').unwrap();
    let err = BatchTable::from_sheet(&sheet, &TableOptions::default()).unwrap_err();
    assert!(matches!(err, BatchError::LabelsRowMissing { .. }));
    assert!(err.is_table_error());
}

#[test]
fn test_missing_action_column() {
    let sheet = CsvSheet::from_reader("Scan Type,motor\nmv,sx\n".as_bytes(), b',').unwrap();
    let err = BatchTable::from_sheet(&sheet, &TableOptions::default().with_labels_row(0))
        .unwrap_err();
    assert!(matches!(err, BatchError::MissingColumn(_)));

    let options = TableOptions::default()
        .with_labels_row(0)
        .with_action_column("scan type");
    let table = BatchTable::from_sheet(&sheet, &options).unwrap();
    assert_eq!(table.action_column, "Scan Type");
    assert_eq!(table.rows()[0].action, "mv");
}
