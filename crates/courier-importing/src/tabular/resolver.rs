//! Format resolution over a list of readers.

use courier_common::CourierError;

use super::{TabularDocument, TabularReader};

/// Tries each reader in registration order; an unrecognized format yields an
/// empty document, which the stage handler turns into a failed job.
pub struct TabularReaderResolver {
    readers: Vec<Box<dyn TabularReader>>,
}

impl TabularReaderResolver {
    pub fn new(readers: Vec<Box<dyn TabularReader>>) -> Self {
        Self { readers }
    }

    /// CSV + XLSX, the formats the platform accepts.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(super::CsvTabularReader),
            Box::new(super::XlsxTabularReader),
        ])
    }
}

impl TabularReader for TabularReaderResolver {
    fn can_read(&self, filename: Option<&str>, content_type: Option<&str>) -> bool {
        self.readers.iter().any(|r| r.can_read(filename, content_type))
    }

    fn read(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
        content: &[u8],
    ) -> Result<TabularDocument, CourierError> {
        for reader in &self.readers {
            if reader.can_read(filename, content_type) {
                return reader.read(filename, content_type, content);
            }
        }
        Ok(TabularDocument::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_csv_by_filename() {
        let resolver = TabularReaderResolver::standard();
        let doc = resolver
            .read(Some("rows.csv"), None, b"phone_number\n+100\n")
            .unwrap();
        assert_eq!(doc.headers, vec!["phone_number"]);
    }

    #[test]
    fn test_unknown_format_yields_empty_document() {
        let resolver = TabularReaderResolver::standard();
        assert!(!resolver.can_read(Some("notes.txt"), Some("text/plain")));
        let doc = resolver.read(Some("notes.txt"), Some("text/plain"), b"hello").unwrap();
        assert!(doc.headers.is_empty());
    }
}
