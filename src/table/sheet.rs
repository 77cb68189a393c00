//! Rectangular cell sources.
//!
//! A batch definition is authored in a spreadsheet and exported as CSV from its first
//! sheet. `SheetSource` hides where the grid came from so the extent detection and the
//! bounded iterator can be exercised against any grid, including instrumented ones in
//! tests.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::BatchResult;

/// Read access to a rectangular grid of text cells.
///
/// Cells outside the populated area read as the empty string.
pub trait SheetSource {
    /// Number of rows in the sheet
    fn rows(&self) -> usize;

    /// Width of the widest row
    fn columns(&self) -> usize;

    /// Raw text of one cell (zero-based coordinates)
    fn cell(&self, row: usize, col: usize) -> &str;

    /// True if the cell holds nothing but whitespace
    fn is_blank(&self, row: usize, col: usize) -> bool {
        self.cell(row, col).trim().is_empty()
    }
}

/// A sheet loaded from a CSV export
#[derive(Debug, Clone, Default)]
pub struct CsvSheet {
    cells: Vec<Vec<String>>,
    width: usize,
}

impl CsvSheet {
    /// Build a sheet from already-split rows
    pub fn from_rows(cells: Vec<Vec<String>>) -> Self {
        let width = cells.iter().map(Vec::len).max().unwrap_or(0);
        Self { cells, width }
    }

    /// Load a CSV export from disk
    pub fn from_path(path: impl AsRef<Path>, delimiter: u8) -> BatchResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let sheet = Self::from_reader(file, delimiter)?;
        debug!(
            path = %path.display(),
            rows = sheet.rows(),
            columns = sheet.columns(),
            "Loaded sheet"
        );
        Ok(sheet)
    }

    /// Parse CSV text from any reader
    ///
    /// Ragged rows are accepted. Blank lines are kept as empty rows: the csv reader drops
    /// them, but a blank line is how a spreadsheet export marks the end of a table.
    pub fn from_reader<R: Read>(mut reader: R, delimiter: u8) -> BatchResult<Self> {
        let mut text = Vec::new();
        reader.read_to_end(&mut text)?;

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_slice());

        let mut cells: Vec<Vec<String>> = Vec::new();
        // zero-based line of `counted_to`
        let mut line = 0u64;
        let mut counted_to = 0usize;
        // first line not yet covered by a row
        let mut next_line = 0u64;

        for result in csv_reader.records() {
            let record = result?;
            // The reader stamps a record where the previous one stopped, which is before
            // any terminators and blank lines it skipped on the way to this one.
            let stamped = record
                .position()
                .map_or(counted_to, |p| p.byte() as usize)
                .clamp(counted_to, text.len());
            let start = stamped
                + text[stamped..]
                    .iter()
                    .take_while(|&&b| matches!(b, b'\r' | b'\n'))
                    .count();
            line += line_breaks(&text[counted_to..start]);
            counted_to = start;

            while next_line < line {
                cells.push(Vec::new());
                next_line += 1;
            }
            // Quoted fields may span lines
            let embedded: u64 = record.iter().map(|f| line_breaks(f.as_bytes())).sum();
            next_line = line + 1 + embedded;
            cells.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::from_rows(cells))
    }
}

/// Count line terminators (`\n`, `\r\n` or a lone `\r`)
fn line_breaks(bytes: &[u8]) -> u64 {
    let mut count = 0;
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        match b {
            b'\n' => count += 1,
            b'\r' => {
                iter.next_if_eq(&&b'\n');
                count += 1;
            }
            _ => {}
        }
    }
    count
}

impl SheetSource for CsvSheet {
    fn rows(&self) -> usize {
        self.cells.len()
    }

    fn columns(&self) -> usize {
        self.width
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .map_or("", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ragged_rows_read_as_blank() {
        let sheet = CsvSheet::from_reader("a,b,c\nd\n".as_bytes(), b',').unwrap();
        assert_eq!(sheet.rows(), 2);
        assert_eq!(sheet.columns(), 3);
        assert_eq!(sheet.cell(1, 0), "d");
        assert_eq!(sheet.cell(1, 2), "");
        assert!(sheet.is_blank(5, 5));
    }

    #[test]
    fn test_blank_lines_are_preserved() {
        let text = "title\n\n\naction,sx\nscan,1\n\nnotes below\n";
        let sheet = CsvSheet::from_reader(text.as_bytes(), b',').unwrap();
        assert_eq!(sheet.rows(), 7);
        assert_eq!(sheet.cell(3, 0), "action");
        assert!(sheet.is_blank(5, 0));
        assert_eq!(sheet.cell(6, 0), "notes below");
    }

    #[test]
    fn test_blank_line_after_table_stays_in_place() {
        let sheet = CsvSheet::from_reader("action,sx\nscan,1\n\ngarbage,x\n".as_bytes(), b',')
            .unwrap();
        assert_eq!(sheet.rows(), 4);
        assert!(sheet.is_blank(2, 0));
        assert_eq!(sheet.cell(3, 0), "garbage");
    }

    #[test]
    fn test_leading_blank_lines() {
        let sheet =
            CsvSheet::from_reader("\n\ntitle\naction,sx\n".as_bytes(), b',').unwrap();
        assert_eq!(sheet.rows(), 4);
        assert!(sheet.is_blank(0, 0));
        assert!(sheet.is_blank(1, 0));
        assert_eq!(sheet.cell(2, 0), "title");
        assert_eq!(sheet.cell(3, 0), "action");
    }

    #[test]
    fn test_crlf_blank_lines_are_preserved() {
        let text = "title\r\n\r\n\r\naction,sx\r\nscan,1\r\n\r\nnotes\r\n";
        let sheet = CsvSheet::from_reader(text.as_bytes(), b',').unwrap();
        assert_eq!(sheet.rows(), 7);
        assert_eq!(sheet.cell(3, 0), "action");
        assert_eq!(sheet.cell(4, 1), "1");
        assert!(sheet.is_blank(5, 0));
        assert_eq!(sheet.cell(6, 0), "notes");
    }

    #[test]
    fn test_missing_final_newline() {
        let sheet = CsvSheet::from_reader("a\n\nb".as_bytes(), b',').unwrap();
        assert_eq!(sheet.rows(), 3);
        assert_eq!(sheet.cell(2, 0), "b");
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(line_breaks(b"a\r\nb\nc\rd"), 3);
        assert_eq!(line_breaks(b"\r\n\r\n"), 2);
        assert_eq!(line_breaks(b"plain"), 0);
    }

    #[test]
    fn test_multiline_quoted_field_keeps_row_alignment() {
        let text = "a,\"two\nlines\"\nb,c\n";
        let sheet = CsvSheet::from_reader(text.as_bytes(), b',').unwrap();
        assert_eq!(sheet.rows(), 2);
        assert_eq!(sheet.cell(1, 0), "b");

        let gap = "a,\"two\nlines\"\n\nb,c\n";
        let sheet = CsvSheet::from_reader(gap.as_bytes(), b',').unwrap();
        assert_eq!(sheet.rows(), 3);
        assert!(sheet.is_blank(1, 0));
        assert_eq!(sheet.cell(2, 0), "b");
    }

    #[test]
    fn test_semicolon_delimiter() {
        let sheet = CsvSheet::from_reader("action;sx\nscan;1,5\n".as_bytes(), b';').unwrap();
        assert_eq!(sheet.cell(1, 1), "1,5");
    }
}
