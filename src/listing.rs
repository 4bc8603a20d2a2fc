//! Parses the portal's document-listing CSV export

use crate::errors::ExportError;
use crate::models::DocumentFields;
use std::path::Path;
use tracing::{info, warn};

/// Column headers the listing export must carry.
const REQUIRED_COLUMNS: [&str; 3] = ["Document ID", "Client Name", "Client Number"];

struct ColumnMap {
    document_id: usize,
    client_name: usize,
    client_number: usize,
    file_section: Option<usize>,
    document_type: Option<usize>,
    description: Option<usize>,
    year: Option<usize>,
    document_date: Option<usize>,
    file_size: Option<usize>,
    file_type: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ExportError> {
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let required = |name: &'static str| {
            position(name).ok_or_else(|| ExportError::ListingColumn(name.to_string()))
        };

        for column in REQUIRED_COLUMNS {
            required(column)?;
        }

        Ok(ColumnMap {
            document_id: required("Document ID")?,
            client_name: required("Client Name")?,
            client_number: required("Client Number")?,
            file_section: position("File Section"),
            document_type: position("Document Type"),
            description: position("Description"),
            year: position("Year"),
            document_date: position("Document Date"),
            file_size: position("File Size"),
            file_type: position("File Type"),
        })
    }
}

fn field(record: &csv::StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .map(|v| v.trim().trim_matches('"').trim().to_string())
        .unwrap_or_default()
}

/// Read the listing CSV into per-document fields, in listing order.
///
/// The listing's declared client must match the requested client by client
/// number; a mismatch is fatal for the listing. Duplicate document ids are
/// passed through; the client aggregate suppresses them on insert.
pub fn parse_listing(
    path: &Path,
    expected_client_number: &str,
) -> Result<Vec<DocumentFields>, ExportError> {
    info!("Reading document listing: {}", path.display());

    let mut reader = csv::Reader::from_path(path)?;
    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut documents = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }

        let client_number = field(&record, Some(columns.client_number));
        if documents.is_empty() && client_number != expected_client_number {
            return Err(ExportError::ListingMismatch {
                expected: expected_client_number.to_string(),
                actual: client_number,
            });
        }

        let document_id = field(&record, Some(columns.document_id));
        if document_id.is_empty() {
            warn!("Skipping listing row without a document id");
            continue;
        }

        documents.push(DocumentFields {
            document_id,
            client_name: field(&record, Some(columns.client_name)),
            file_section: field(&record, columns.file_section),
            document_type: field(&record, columns.document_type),
            description: field(&record, columns.description),
            year: field(&record, columns.year),
            document_date: field(&record, columns.document_date),
            file_size: field(&record, columns.file_size),
            file_type: field(&record, columns.file_type),
        });
    }

    info!("Read {} documents from listing", documents.len());
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "Document ID,Client Name,Client Number,File Section,Document Type,Description,Year,Document Date,File Size,File Type";

    fn write_listing(dir: &TempDir, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("listing.csv");
        let mut contents = String::from(HEADER);
        for row in rows {
            contents.push('\n');
            contents.push_str(row);
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_listing_rows() {
        let tmp = TempDir::new().unwrap();
        let path = write_listing(
            &tmp,
            &[
                "D1,Acme Corp,C7,Bookkeeping,Invoice,Q1,2020,01/15/2020,120 KB,pdf",
                "D2,Acme Corp,C7,Clientflow,Memo,,,,90 KB,docx",
            ],
        );

        let docs = parse_listing(&path, "C7").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].document_id, "D1");
        assert_eq!(docs[0].file_section, "Bookkeeping");
        assert_eq!(docs[1].year, "");
        assert_eq!(docs[1].file_type, "docx");
    }

    #[test]
    fn test_client_number_mismatch_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = write_listing(
            &tmp,
            &["D1,Acme Corp,C8,Bookkeeping,Invoice,Q1,2020,,120 KB,pdf"],
        );

        let err = parse_listing(&path, "C7").unwrap_err();
        assert!(matches!(err, ExportError::ListingMismatch { .. }));
    }

    #[test]
    fn test_missing_required_column() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("listing.csv");
        std::fs::write(&path, "Client Name,Client Number\nAcme,C7\n").unwrap();

        let err = parse_listing(&path, "C7").unwrap_err();
        assert!(matches!(err, ExportError::ListingColumn(c) if c == "Document ID"));
    }

    #[test]
    fn test_header_only_listing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = write_listing(&tmp, &[]);
        let docs = parse_listing(&path, "C7").unwrap();
        assert!(docs.is_empty());
    }
}
