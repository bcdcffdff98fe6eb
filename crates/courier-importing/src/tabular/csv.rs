//! CSV tabular reader.

use courier_common::CourierError;
use std::collections::BTreeMap;
use std::io::Cursor;

use super::{TabularDocument, TabularReader, TabularRow};

pub struct CsvTabularReader;

fn decode_bytes(content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content).into_owned();
    // strip a UTF-8 BOM if present
    text.strip_prefix('\u{feff}').map(|s| s.to_string()).unwrap_or(text)
}

impl TabularReader for CsvTabularReader {
    fn can_read(&self, filename: Option<&str>, content_type: Option<&str>) -> bool {
        let name = filename.unwrap_or_default().to_lowercase();
        let ct = content_type.unwrap_or_default().to_lowercase();
        name.ends_with(".csv") || ct.contains("text/csv") || ct.contains("application/csv")
    }

    fn read(
        &self,
        _filename: Option<&str>,
        _content_type: Option<&str>,
        content: &[u8],
    ) -> Result<TabularDocument, CourierError> {
        let text = decode_bytes(content);
        let mut reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(Cursor::new(text.into_bytes()));

        let header_record = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(_) => return Ok(TabularDocument::empty()),
        };

        // keep non-empty headers together with their column index
        let headers_with_index: Vec<(usize, String)> = header_record
            .iter()
            .enumerate()
            .filter_map(|(index, header)| {
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

        // header is row 1, so the first data row is 2
        let rows = reader
            .into_records()
            .enumerate()
            .map(move |(index, record)| {
                let row_number = index as u64 + 2;
                let record = record.map_err(|e| {
                    CourierError::validation(format!("CSV parse error at row {row_number}: {e}"))
                })?;

                let mut values = BTreeMap::new();
                for (column, header) in &headers_with_index {
                    let cell = record.get(*column).unwrap_or_default();
                    values.insert(header.clone(), cell.to_string());
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

    fn read_all(content: &[u8]) -> (Vec<String>, Vec<TabularRow>) {
        let doc = CsvTabularReader
            .read(Some("contacts.csv"), Some("text/csv"), content)
            .unwrap();
        let rows: Vec<TabularRow> = doc.rows.map(|r| r.unwrap()).collect();
        (doc.headers, rows)
    }

    #[test]
    fn test_can_read_by_extension_and_content_type() {
        let reader = CsvTabularReader;
        assert!(reader.can_read(Some("a.CSV"), None));
        assert!(reader.can_read(None, Some("text/csv; charset=utf-8")));
        assert!(reader.can_read(None, Some("application/csv")));
        assert!(!reader.can_read(Some("a.xlsx"), Some("application/vnd.ms-excel")));
    }

    #[test]
    fn test_headers_and_row_numbering() {
        let (headers, rows) = read_all(b"phone_number,text\n+100,hello\n+200,hi\n");
        assert_eq!(headers, vec!["phone_number", "text"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[1].row_number, 3);
        assert_eq!(rows[0].values["phone_number"], "+100");
        assert_eq!(rows[1].values["text"], "hi");
    }

    #[test]
    fn test_headers_are_trimmed() {
        let (headers, rows) = read_all(b" phone_number , text \n+100,hello\n");
        assert_eq!(headers, vec!["phone_number", "text"]);
        assert_eq!(rows[0].values["phone_number"], "+100");
    }

    #[test]
    fn test_empty_file_yields_empty_document() {
        let (headers, rows) = read_all(b"");
        assert!(headers.is_empty());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_bom_is_stripped() {
        let (headers, _) = read_all("\u{feff}phone_number\n+100\n".as_bytes());
        assert_eq!(headers, vec!["phone_number"]);
    }

    #[test]
    fn test_short_rows_fill_empty_cells() {
        let (_, rows) = read_all(b"phone_number,text\n+100\n");
        assert_eq!(rows[0].values["phone_number"], "+100");
        assert_eq!(rows[0].values["text"], "");
    }
}
