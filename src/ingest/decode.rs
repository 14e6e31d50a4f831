use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use std::io::Cursor;

use crate::ingest::record::RawRow;

/// A decoded file: trimmed header names plus data rows in file order.
/// Decoding is the only fatal stage of ingestion; once a `Table` exists,
/// everything downstream is row-by-row best-effort.
#[derive(Debug)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<DataRow>,
}

/// One data row with the 1-based line it occupied in the source file
/// (the header row is line 1).
#[derive(Debug)]
pub struct DataRow {
    pub line: usize,
    pub cells: RawRow,
}

/// Decode delimited text. Blank lines are skipped by the reader and do not
/// consume row numbers; `flexible` keeps short/long records as rows rather
/// than structural failures, so our own required-field checks fire instead.
pub fn decode_csv(bytes: &[u8]) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(bytes));

    let headers: Vec<String> = rdr
        .headers()
        .context("reading CSV header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx + 1))?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);

        let mut cells = RawRow::new();
        for (i, cell) in record.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            if let Some(header) = headers.get(i) {
                cells.insert(header.clone(), cell.to_string());
            }
        }
        rows.push(DataRow { line, cells });
    }

    Ok(Table { headers, rows })
}

/// Decode the first worksheet of an XLSX/XLS workbook. Row 1 is the header
/// row; fully blank rows are skipped without consuming a row number slot in
/// the error report (line numbers stay tied to sheet position).
pub fn decode_workbook(bytes: &[u8]) -> Result<Table> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).context("opening spreadsheet")?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no worksheets"))?
        .context("reading first worksheet")?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(row) => row
            .iter()
            .map(|c| cell_to_string(c).trim().to_string())
            .collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for (idx, row) in sheet_rows.enumerate() {
        if row.iter().all(is_blank_cell) {
            continue;
        }
        let mut cells = RawRow::new();
        for (i, cell) in row.iter().enumerate() {
            let value = cell_to_string(cell);
            if value.is_empty() {
                continue;
            }
            if let Some(header) = headers.get(i) {
                cells.insert(header.clone(), value);
            }
        }
        // header occupies sheet row 1
        rows.push(DataRow {
            line: idx + 2,
            cells,
        });
    }

    Ok(Table { headers, rows })
}

fn is_blank_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Render a cell the way it would read in the equivalent CSV. Floats print
/// without a trailing `.0`, so whole-number amounts survive coercion.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_headers_and_rows_with_line_numbers() {
        let csv = "Member Name,Amount,Agency\nJohn,10,A\nJane,20,B\n";
        let table = decode_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["Member Name", "Amount", "Agency"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 3);
        assert_eq!(table.rows[0].cells.get("Member Name").unwrap(), "John");
    }

    #[test]
    fn blank_lines_are_skipped_and_do_not_shift_numbering() {
        let csv = "Member Name,Amount,Agency\nJohn,10,A\n\nJane,20,B\n";
        let table = decode_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        // the blank line still occupied line 3 in the file
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn header_cells_are_trimmed() {
        let csv = " Member Name , Amount ,Agency\nJohn,10,A\n";
        let table = decode_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["Member Name", "Amount", "Agency"]);
    }

    #[test]
    fn empty_cells_are_absent_from_the_raw_row() {
        let csv = "Member Name,Amount,Agency\nJohn,,A\n";
        let table = decode_csv(csv.as_bytes()).unwrap();
        assert!(!table.rows[0].cells.contains_key("Amount"));
    }

    #[test]
    fn short_records_decode_instead_of_failing() {
        let csv = "Member Name,Amount,Agency\nJohn,10\n";
        let table = decode_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(!table.rows[0].cells.contains_key("Agency"));
    }

    #[test]
    fn garbage_bytes_are_a_structural_failure() {
        // invalid UTF-8 in a record is the container's problem, not a row's
        let bytes = b"Member Name,Amount,Agency\nJo\xffhn,10,A\n";
        assert!(decode_csv(bytes).is_err());
    }

    #[test]
    fn workbook_decodes_headers_and_rows() {
        let bytes = fixtures::workbook_bytes(Some(fixtures::SAMPLE_SHEET));
        let table = decode_workbook(&bytes).unwrap();
        assert_eq!(table.headers, vec!["Member Name", "Amount", "Agency"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells.get("Member Name").unwrap(), "John Doe");
        assert_eq!(table.rows[0].cells.get("Agency").unwrap(), "ABC");
    }

    #[test]
    fn workbook_blank_row_is_skipped_without_shifting_line_numbers() {
        let bytes = fixtures::workbook_bytes(Some(fixtures::SAMPLE_SHEET));
        let table = decode_workbook(&bytes).unwrap();
        assert_eq!(table.rows[0].line, 2);
        // sheet row 3 is blank; Jane still reports her sheet position
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn workbook_numeric_cells_read_like_their_csv_text() {
        let bytes = fixtures::workbook_bytes(Some(fixtures::SAMPLE_SHEET));
        let table = decode_workbook(&bytes).unwrap();
        assert_eq!(table.rows[0].cells.get("Amount").unwrap(), "1250.5");
        // whole-number float must not pick up a trailing ".0"
        assert_eq!(table.rows[1].cells.get("Amount").unwrap(), "3500");
    }

    #[test]
    fn workbook_without_worksheets_is_a_structural_failure() {
        let bytes = fixtures::workbook_bytes(None);
        let err = decode_workbook(&bytes).unwrap_err();
        assert!(err.to_string().contains("no worksheets"));
    }

    #[test]
    fn workbook_garbage_bytes_are_a_structural_failure() {
        assert!(decode_workbook(b"definitely not a spreadsheet").is_err());
    }
}
