//! Progress ledger: client work queue and per-document download log
//!
//! Two tabular projections, persisted as CSV. The client list drives the run
//! (rows with status Pending are the work queue) and receives per-client
//! outcomes; the document log is write-mostly and keyed by
//! (client name, client number, document id).

use crate::errors::LedgerError;
use crate::models::{ClientStatus, Document, DocumentStatus};
use std::path::Path;
use tracing::{info, warn};

const CLIENT_COLUMNS: [&str; 7] = [
    "Status",
    "Description",
    "Client Name",
    "Client Number",
    "Total Documents",
    "Number Of Files Downloaded",
    "Client Folder Path",
];

const DOCUMENT_COLUMNS: [&str; 16] = [
    "Download Status",
    "Download Description",
    "Client Name",
    "Client Number",
    "File Name",
    "File Path",
    "Category",
    "File Section",
    "Document Type",
    "Description",
    "Year",
    "Document Date",
    "File Size",
    "Document ID",
    "File Type",
    "Download Time",
];

/// One row of the client list.
#[derive(Debug, Clone)]
pub struct ClientRow {
    pub status: ClientStatus,
    pub description: String,
    pub client_name: String,
    pub client_number: String,
    pub total_documents: usize,
    pub files_downloaded: usize,
    pub folder_path: String,
}

/// One row of the document log.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub status: DocumentStatus,
    pub status_description: String,
    pub client_name: String,
    pub client_number: String,
    pub file_name: String,
    pub file_path: String,
    pub category: String,
    pub file_section: String,
    pub document_type: String,
    pub description: String,
    pub year: String,
    pub document_date: String,
    pub file_size: String,
    pub document_id: String,
    pub file_type: String,
    pub download_time: String,
}

#[derive(Debug, Default)]
pub struct Ledger {
    clients: Vec<ClientRow>,
    documents: Vec<DocumentRow>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Load the client list (required) and document log (created empty when
    /// the file does not exist yet).
    pub fn load(client_list: &Path, document_log: &Path) -> Result<Self, LedgerError> {
        let clients = read_client_rows(client_list)?;
        let documents = if document_log.exists() {
            read_document_rows(document_log)?
        } else {
            Vec::new()
        };
        info!(
            "Loaded ledger: {} clients, {} logged documents",
            clients.len(),
            documents.len()
        );
        Ok(Ledger { clients, documents })
    }

    /// Persist both tables, rewriting the files in full.
    pub fn save(&self, client_list: &Path, document_log: &Path) -> Result<(), LedgerError> {
        write_client_rows(client_list, &self.clients)?;
        write_document_rows(document_log, &self.documents)?;
        Ok(())
    }

    pub fn clients(&self) -> &[ClientRow] {
        &self.clients
    }

    pub fn documents(&self) -> &[DocumentRow] {
        &self.documents
    }

    pub fn add_client(&mut self, row: ClientRow) {
        self.clients.push(row);
    }

    /// Clients still waiting to be processed, in list order.
    pub fn pending_clients(&self) -> Vec<(String, String)> {
        self.clients
            .iter()
            .filter(|c| c.status == ClientStatus::Pending)
            .map(|c| (c.client_name.clone(), c.client_number.clone()))
            .collect()
    }

    /// Write a client outcome back onto its row.
    #[allow(clippy::too_many_arguments)]
    pub fn update_client(
        &mut self,
        client_name: &str,
        client_number: &str,
        status: ClientStatus,
        description: &str,
        total_documents: usize,
        files_downloaded: usize,
        folder_path: &str,
    ) {
        match self
            .clients
            .iter_mut()
            .find(|c| c.client_name == client_name && c.client_number == client_number)
        {
            Some(row) => {
                row.status = status;
                row.description = description.to_string();
                row.total_documents = total_documents;
                row.files_downloaded = files_downloaded;
                if !folder_path.is_empty() {
                    row.folder_path = folder_path.to_string();
                }
            }
            None => warn!(
                "No ledger row for client '{} | {}'",
                client_name, client_number
            ),
        }
    }

    /// Whether a document id was already recorded for this client; used to
    /// suppress duplicate listing rows across repeated exports.
    pub fn has_document(
        &self,
        client_name: &str,
        client_number: &str,
        document_id: &str,
    ) -> bool {
        self.documents.iter().any(|d| {
            d.client_name == client_name
                && d.client_number == client_number
                && d.document_id == document_id
        })
    }

    /// Seed a log row for a freshly listed document. No-op when the document
    /// was already recorded for this client.
    pub fn seed_document(&mut self, client_number: &str, document: &Document) {
        if self.has_document(&document.client_name, client_number, &document.document_id) {
            return;
        }
        self.documents.push(DocumentRow {
            status: DocumentStatus::Pending,
            status_description: String::new(),
            client_name: document.client_name.clone(),
            client_number: client_number.to_string(),
            file_name: document.canonical_name_without_id().to_string(),
            file_path: String::new(),
            category: document.category.as_str().to_string(),
            file_section: document.file_section.clone(),
            document_type: document.document_type.clone(),
            description: document.description.clone(),
            year: document.year.clone(),
            document_date: document.document_date.clone(),
            file_size: document.file_size.clone(),
            document_id: document.document_id.clone(),
            file_type: document.file_type.clone(),
            download_time: String::new(),
        });
    }

    /// Record a download outcome on the document's log row.
    #[allow(clippy::too_many_arguments)]
    pub fn record_document(
        &mut self,
        client_name: &str,
        client_number: &str,
        document_id: &str,
        status: DocumentStatus,
        description: &str,
        file_name: &str,
        file_path: &str,
        download_time: &str,
    ) {
        match self.documents.iter_mut().find(|d| {
            d.client_name == client_name
                && d.client_number == client_number
                && d.document_id == document_id
        }) {
            Some(row) => {
                row.status = status;
                row.status_description = description.to_string();
                if !file_name.is_empty() {
                    row.file_name = file_name.to_string();
                }
                if !file_path.is_empty() {
                    row.file_path = file_path.to_string();
                }
                if !download_time.is_empty() {
                    row.download_time = download_time.to_string();
                }
            }
            None => warn!(
                "No log row for document '{}' of client '{} | {}'",
                document_id, client_name, client_number
            ),
        }
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, LedgerError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| LedgerError::MissingColumn(name.to_string()))
}

fn read_client_rows(path: &Path) -> Result<Vec<ClientRow>, LedgerError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut indices = Vec::with_capacity(CLIENT_COLUMNS.len());
    for column in CLIENT_COLUMNS {
        indices.push(column_index(&headers, column)?);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let get = |i: usize| record.get(indices[i]).unwrap_or("").trim().to_string();
        let status_raw = get(0);
        let status = match ClientStatus::parse(&status_raw) {
            Some(s) => s,
            None => {
                if !status_raw.is_empty() {
                    warn!("Unrecognized client status '{}', treating as Pending", status_raw);
                }
                ClientStatus::Pending
            }
        };
        rows.push(ClientRow {
            status,
            description: get(1),
            client_name: get(2),
            client_number: get(3),
            total_documents: get(4).parse().unwrap_or(0),
            files_downloaded: get(5).parse().unwrap_or(0),
            folder_path: get(6),
        });
    }
    Ok(rows)
}

fn write_client_rows(path: &Path, rows: &[ClientRow]) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CLIENT_COLUMNS)?;
    for row in rows {
        let total = row.total_documents.to_string();
        let downloaded = row.files_downloaded.to_string();
        writer.write_record([
            row.status.as_str(),
            row.description.as_str(),
            row.client_name.as_str(),
            row.client_number.as_str(),
            total.as_str(),
            downloaded.as_str(),
            row.folder_path.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn read_document_rows(path: &Path) -> Result<Vec<DocumentRow>, LedgerError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut indices = Vec::with_capacity(DOCUMENT_COLUMNS.len());
    for column in DOCUMENT_COLUMNS {
        indices.push(column_index(&headers, column)?);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let get = |i: usize| record.get(indices[i]).unwrap_or("").trim().to_string();
        rows.push(DocumentRow {
            status: DocumentStatus::parse(&get(0)),
            status_description: get(1),
            client_name: get(2),
            client_number: get(3),
            file_name: get(4),
            file_path: get(5),
            category: get(6),
            file_section: get(7),
            document_type: get(8),
            description: get(9),
            year: get(10),
            document_date: get(11),
            file_size: get(12),
            document_id: get(13),
            file_type: get(14),
            download_time: get(15),
        });
    }
    Ok(rows)
}

fn write_document_rows(path: &Path, rows: &[DocumentRow]) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(DOCUMENT_COLUMNS)?;
    for row in rows {
        writer.write_record([
            row.status.as_str(),
            row.status_description.as_str(),
            row.client_name.as_str(),
            row.client_number.as_str(),
            row.file_name.as_str(),
            row.file_path.as_str(),
            row.category.as_str(),
            row.file_section.as_str(),
            row.document_type.as_str(),
            row.description.as_str(),
            row.year.as_str(),
            row.document_date.as_str(),
            row.file_size.as_str(),
            row.document_id.as_str(),
            row.file_type.as_str(),
            row.download_time.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, DocumentFields};
    use tempfile::TempDir;

    fn client_row(name: &str, number: &str, status: ClientStatus) -> ClientRow {
        ClientRow {
            status,
            description: String::new(),
            client_name: name.to_string(),
            client_number: number.to_string(),
            total_documents: 0,
            files_downloaded: 0,
            folder_path: String::new(),
        }
    }

    fn document(id: &str) -> Document {
        Document::new(
            DocumentFields {
                document_id: id.to_string(),
                client_name: "Acme Corp".to_string(),
                file_section: "Bookkeeping".to_string(),
                document_type: "Invoice".to_string(),
                description: "Q1".to_string(),
                year: "2020".to_string(),
                document_date: String::new(),
                file_size: String::new(),
                file_type: "pdf".to_string(),
            },
            2018,
        )
    }

    #[test]
    fn test_pending_clients_filter() {
        let mut ledger = Ledger::new();
        ledger.add_client(client_row("Acme Corp", "C7", ClientStatus::Pending));
        ledger.add_client(client_row("Beta LLC", "C8", ClientStatus::Success));
        ledger.add_client(client_row("Gamma Inc", "C9", ClientStatus::Pending));

        let pending = ledger.pending_clients();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], ("Acme Corp".to_string(), "C7".to_string()));
    }

    #[test]
    fn test_seed_document_is_idempotent() {
        let mut ledger = Ledger::new();
        ledger.seed_document("C7", &document("D1"));
        ledger.seed_document("C7", &document("D1"));
        assert_eq!(ledger.documents().len(), 1);
        assert!(ledger.has_document("Acme Corp", "C7", "D1"));
        assert!(!ledger.has_document("Acme Corp", "C8", "D1"));
    }

    #[test]
    fn test_record_document_updates_row() {
        let mut ledger = Ledger::new();
        ledger.seed_document("C7", &document("D1"));
        ledger.record_document(
            "Acme Corp",
            "C7",
            "D1",
            DocumentStatus::Success,
            "File downloaded successfully",
            "Acme Corp_2020_Invoice_Q1_D1.pdf",
            "/out/Acme Corp_2020_Invoice_Q1_D1.pdf",
            "2024-06-01 10:00:00",
        );
        let row = &ledger.documents()[0];
        assert_eq!(row.status, DocumentStatus::Success);
        assert_eq!(row.download_time, "2024-06-01 10:00:00");
    }

    #[test]
    fn test_csv_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let client_list = tmp.path().join("client_list.csv");
        let document_log = tmp.path().join("document_log.csv");

        let mut ledger = Ledger::new();
        ledger.add_client(client_row("Acme Corp", "C7", ClientStatus::Pending));
        ledger.seed_document("C7", &document("D1"));
        ledger.update_client(
            "Acme Corp",
            "C7",
            ClientStatus::Warning,
            "Downloaded 1/2 files",
            2,
            1,
            "/out/C7 - Acme Corp",
        );
        ledger.save(&client_list, &document_log).unwrap();

        let reloaded = Ledger::load(&client_list, &document_log).unwrap();
        assert_eq!(reloaded.clients().len(), 1);
        assert_eq!(reloaded.clients()[0].status, ClientStatus::Warning);
        assert_eq!(reloaded.clients()[0].total_documents, 2);
        assert_eq!(reloaded.documents().len(), 1);
        assert_eq!(reloaded.documents()[0].document_id, "D1");
    }

    #[test]
    fn test_load_missing_document_log_is_empty() {
        let tmp = TempDir::new().unwrap();
        let client_list = tmp.path().join("client_list.csv");
        write_client_rows(&client_list, &[client_row("Acme Corp", "C7", ClientStatus::Pending)])
            .unwrap();

        let ledger = Ledger::load(&client_list, &tmp.path().join("missing.csv")).unwrap();
        assert_eq!(ledger.clients().len(), 1);
        assert!(ledger.documents().is_empty());
    }
}
