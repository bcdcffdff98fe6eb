//! Tabular reader port.
//!
//! A reader turns file bytes into headers plus a stream of rows. Rows are
//! lazily iterated so large files never materialize in memory (the XLSX
//! backend is the exception; its format requires a full parse).

use courier_common::CourierError;
use std::collections::BTreeMap;

pub mod csv;
pub mod resolver;
pub mod xlsx;

pub use self::csv::CsvTabularReader;
pub use resolver::TabularReaderResolver;
pub use xlsx::XlsxTabularReader;

/// One data row; `row_number` is 1-based over the file, so the first data
/// row after the header line is 2.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRow {
    pub row_number: u64,
    /// header -> cell value, header in original casing
    pub values: BTreeMap<String, String>,
}

/// Parsed document: headers plus a lazy row stream.
pub struct TabularDocument {
    pub headers: Vec<String>,
    pub rows: Box<dyn Iterator<Item = Result<TabularRow, CourierError>> + Send>,
}

impl std::fmt::Debug for TabularDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabularDocument")
            .field("headers", &self.headers)
            .finish()
    }
}

impl TabularDocument {
    /// Document with no headers and no rows; the stage handler maps this to
    /// a failed job.
    pub fn empty() -> Self {
        Self {
            headers: Vec::new(),
            rows: Box::new(std::iter::empty()),
        }
    }
}

pub trait TabularReader: Send + Sync {
    fn can_read(&self, filename: Option<&str>, content_type: Option<&str>) -> bool;

    fn read(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
        content: &[u8],
    ) -> Result<TabularDocument, CourierError>;
}
