//! XLSX tabular reader over calamine.
//!
//! Reads the first worksheet; the first row is the header line. Cells are
//! stringified: integral floats lose their trailing `.0` (spreadsheets love
//! turning phone numbers into floats) and datetime cells render as naive
//! ISO-8601, which normalization later coerces to UTC.

use calamine::{Data, Reader, Xlsx};
use courier_common::CourierError;
use std::collections::BTreeMap;
use std::io::Cursor;

use super::{TabularDocument, TabularReader, TabularRow};

pub struct XlsxTabularReader;

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 9.0e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
    }
}

impl TabularReader for XlsxTabularReader {
    fn can_read(&self, filename: Option<&str>, content_type: Option<&str>) -> bool {
        let name = filename.unwrap_or_default().to_lowercase();
        let ct = content_type.unwrap_or_default().to_lowercase();
        name.ends_with(".xlsx")
            || ct.contains("spreadsheetml")
            || ct.contains("application/vnd.ms-excel")
    }

    fn read(
        &self,
        _filename: Option<&str>,
        _content_type: Option<&str>,
        content: &[u8],
    ) -> Result<TabularDocument, CourierError> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(content.to_vec()))
            .map_err(|e| CourierError::validation(format!("Invalid XLSX file: {e}")))?;

        let range = match workbook.worksheet_range_at(0) {
            Some(Ok(range)) => range,
            Some(Err(e)) => {
                return Err(CourierError::validation(format!("Invalid XLSX sheet: {e}")))
            }
            None => return Ok(TabularDocument::empty()),
        };

        let mut row_iter = range.rows();
        let Some(header_row) = row_iter.next() else {
            return Ok(TabularDocument::empty());
        };

        let headers_with_index: Vec<(usize, String)> = header_row
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| {
                let header = cell_to_string(cell);
                let header = header.trim();
                if header.is_empty() {
                    None
                } else {
                    Some((index, header.to_string()))
                }
            })
            .collect();

        if headers_with_index.is_empty() {
            return Ok(TabularDocument::empty());
        }

        let headers: Vec<String> = headers_with_index.iter().map(|(_, h)| h.clone()).collect();

        // the format is zip-based, so rows are already materialized
        let data_rows: Vec<Vec<Data>> = row_iter.map(|row| row.to_vec()).collect();

        let rows = data_rows.into_iter().enumerate().map(move |(index, row)| {
            let row_number = index as u64 + 2;
            let mut values = BTreeMap::new();
            for (column, header) in &headers_with_index {
                let cell = row.get(*column).map(cell_to_string).unwrap_or_default();
                values.insert(header.clone(), cell);
            }
            Ok(TabularRow { row_number, values })
        });

        Ok(TabularDocument {
            headers,
            rows: Box::new(rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_read_by_extension_and_content_type() {
        let reader = XlsxTabularReader;
        assert!(reader.can_read(Some("contacts.XLSX"), None));
        assert!(reader.can_read(
            None,
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        ));
        assert!(!reader.can_read(Some("contacts.csv"), Some("text/csv")));
    }

    #[test]
    fn test_cell_stringification() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("hi".into())), "hi");
        assert_eq!(cell_to_string(&Data::Int(42)), "42");
        assert_eq!(cell_to_string(&Data::Float(123456789.0)), "123456789");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
        assert_eq!(
            cell_to_string(&Data::DateTimeIso("2030-01-01T00:00:00".into())),
            "2030-01-01T00:00:00"
        );
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let err = XlsxTabularReader
            .read(Some("a.xlsx"), None, b"not a zip archive")
            .unwrap_err();
        assert!(err.to_string().contains("Invalid XLSX"));
    }
}
