//! Table boundaries within a sheet.
//!
//! The table starts at the labels row. Its width ends at the first blank label and its
//! height ends at the first data row that is blank across every labelled column. Anything
//! to the right of or below that rectangle belongs to the author (titles, notes, scratch
//! values) and is never read by [`BoundedRows`].

use serde::Serialize;

use super::sheet::SheetSource;
use crate::error::{BatchError, BatchResult};

/// Declared rectangular region of a table inside a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableExtent {
    /// Zero-based sheet row holding the column labels
    pub labels_row: usize,
    /// Number of data rows beneath the labels row
    pub rows: usize,
    /// Number of labelled columns, starting at column 0
    pub columns: usize,
}

impl TableExtent {
    /// Zero-based sheet row of the first data row
    pub fn first_data_row(&self) -> usize {
        self.labels_row + 1
    }

    /// One-based sheet row number (as shown by a spreadsheet) of a data row
    pub fn sheet_row_number(&self, index: usize) -> usize {
        self.first_data_row() + index + 1
    }

    /// True if a zero-based sheet coordinate lies inside the data region
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.first_data_row() && row < self.first_data_row() + self.rows && col < self.columns
    }
}

/// Identify how many rows and columns belong to the table whose labels sit on `labels_row`
pub fn find_table_extent<S: SheetSource + ?Sized>(
    sheet: &S,
    labels_row: usize,
) -> BatchResult<TableExtent> {
    if labels_row >= sheet.rows() {
        return Err(BatchError::LabelsRowMissing {
            labels_row,
            rows: sheet.rows(),
        });
    }

    let columns = (0..sheet.columns())
        .find(|&col| sheet.is_blank(labels_row, col))
        .unwrap_or_else(|| sheet.columns());
    if columns == 0 {
        return Err(BatchError::EmptyTable { labels_row });
    }

    let available = sheet.rows() - labels_row - 1;
    let rows = (0..available)
        .find(|&offset| {
            let row = labels_row + 1 + offset;
            (0..columns).all(|col| sheet.is_blank(row, col))
        })
        .unwrap_or(available);

    Ok(TableExtent {
        labels_row,
        rows,
        columns,
    })
}

/// Extent covering every cell from the labels row down to the end of the sheet
///
/// Used when the caller asks to keep content outside the table. Stray cells then reach
/// the handlers as ordinary parameters. Rows above the labels row are still skipped and
/// labels still come from the labels row; blank labels get positional `column_N` names.
pub fn full_extent<S: SheetSource + ?Sized>(
    sheet: &S,
    labels_row: usize,
) -> BatchResult<TableExtent> {
    if labels_row >= sheet.rows() {
        return Err(BatchError::LabelsRowMissing {
            labels_row,
            rows: sheet.rows(),
        });
    }
    if sheet.columns() == 0 {
        return Err(BatchError::EmptyTable { labels_row });
    }
    Ok(TableExtent {
        labels_row,
        rows: sheet.rows() - labels_row - 1,
        columns: sheet.columns(),
    })
}

/// Iterator over the data rows of a sheet, restricted to a [`TableExtent`]
///
/// Yields `(index, cells)` where `index` is zero-based within the table and `cells` holds
/// exactly `extent.columns` entries.
pub struct BoundedRows<'a, S: SheetSource + ?Sized> {
    sheet: &'a S,
    extent: TableExtent,
    next: usize,
}

impl<'a, S: SheetSource + ?Sized> BoundedRows<'a, S> {
    /// Create a bounded iterator
    pub fn new(sheet: &'a S, extent: TableExtent) -> Self {
        Self {
            sheet,
            extent,
            next: 0,
        }
    }

    /// The extent this iterator is confined to
    pub fn extent(&self) -> TableExtent {
        self.extent
    }
}

impl<'a, S: SheetSource + ?Sized> Iterator for BoundedRows<'a, S> {
    type Item = (usize, Vec<&'a str>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.extent.rows {
            return None;
        }
        let index = self.next;
        let row = self.extent.first_data_row() + index;
        let cells = (0..self.extent.columns)
            .map(|col| self.sheet.cell(row, col))
            .collect();
        self.next += 1;
        Some((index, cells))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.extent.rows - self.next;
        (remaining, Some(remaining))
    }
}

impl<'a, S: SheetSource + ?Sized> ExactSizeIterator for BoundedRows<'a, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::sheet::CsvSheet;

    fn sheet(text: &str) -> CsvSheet {
        CsvSheet::from_reader(text.as_bytes(), b',').unwrap()
    }

    #[test]
    fn test_extent_stops_at_blank_label_and_blank_row() {
        let s = sheet(
            "Title,,,,\n,,,,\n,,,,\naction,sx,sy,,note\nimage,0,0,,x\nscan,5.1,-3.2,,\n,,,,\n,,,,stray\n",
        );
        let extent = find_table_extent(&s, 3).unwrap();
        assert_eq!(extent.columns, 3);
        assert_eq!(extent.rows, 2);
        assert_eq!(extent.first_data_row(), 4);
        assert_eq!(extent.sheet_row_number(0), 5);
    }

    #[test]
    fn test_extent_runs_to_end_without_terminator() {
        let s = sheet("action,sx\nscan,1\nscan,2\n");
        let extent = find_table_extent(&s, 0).unwrap();
        assert_eq!(extent.rows, 2);
        assert_eq!(extent.columns, 2);
    }

    #[test]
    fn test_blank_row_ignores_cells_right_of_table() {
        // The third data row has content only outside the labelled columns
        let s = sheet("action,sx,,\nscan,1,,\n,,,junk\nscan,2,,\n");
        let extent = find_table_extent(&s, 0).unwrap();
        assert_eq!(extent.rows, 1);
    }

    #[test]
    fn test_labels_row_beyond_sheet() {
        let s = sheet("action\n");
        assert!(matches!(
            find_table_extent(&s, 3),
            Err(BatchError::LabelsRowMissing { labels_row: 3, rows: 1 })
        ));
    }

    #[test]
    fn test_blank_labels_row_is_empty_table() {
        let s = sheet(",x\nscan,1\n");
        assert!(matches!(
            find_table_extent(&s, 0),
            Err(BatchError::EmptyTable { .. })
        ));
    }

    #[test]
    fn test_full_extent_covers_sheet() {
        let s = sheet("action,sx,,\nscan,1,,\n,,,junk\n");
        let extent = full_extent(&s, 0).unwrap();
        assert_eq!(extent.rows, 2);
        assert_eq!(extent.columns, 4);
    }

    #[test]
    fn test_bounded_rows_yields_extent_width() {
        let s = sheet("action,sx,,extra\nscan,1,,9\nmv,2,,9\n");
        let extent = find_table_extent(&s, 0).unwrap();
        let rows: Vec<_> = BoundedRows::new(&s, extent).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], (1, vec!["mv", "2"]));
    }
}
