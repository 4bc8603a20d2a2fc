//! Document and client aggregates with filename/path derivation

use crate::errors::FolderCreationError;
use crate::mapping::{classify, Category};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Characters stripped from derived file and folder names.
pub const FORBIDDEN_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Per-document download outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Not attempted yet; serialized as an empty status column
    #[default]
    Pending,
    Success,
    Error,
    Warning,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "",
            DocumentStatus::Success => "Success",
            DocumentStatus::Error => "Error",
            DocumentStatus::Warning => "Warning",
        }
    }

    pub fn parse(s: &str) -> DocumentStatus {
        match s.trim() {
            "Success" => DocumentStatus::Success,
            "Error" => DocumentStatus::Error,
            "Warning" => DocumentStatus::Warning,
            _ => DocumentStatus::Pending,
        }
    }
}

/// Per-client processing outcome, persisted on the client's ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientStatus {
    Pending,
    InProgress,
    Success,
    Warning,
    Error,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Pending => "Pending",
            ClientStatus::InProgress => "InProgress",
            ClientStatus::Success => "Success",
            ClientStatus::Warning => "Warning",
            ClientStatus::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Option<ClientStatus> {
        match s.trim() {
            "Pending" => Some(ClientStatus::Pending),
            "InProgress" => Some(ClientStatus::InProgress),
            "Success" => Some(ClientStatus::Success),
            "Warning" => Some(ClientStatus::Warning),
            "Error" => Some(ClientStatus::Error),
            _ => None,
        }
    }
}

/// Descriptive attributes of one listing row, as exported by the portal.
#[derive(Debug, Clone, Default)]
pub struct DocumentFields {
    pub document_id: String,
    pub client_name: String,
    pub file_section: String,
    pub document_type: String,
    pub description: String,
    pub year: String,
    pub document_date: String,
    pub file_size: String,
    pub file_type: String,
}

/// One document owned by a client.
///
/// Name derivation happens once at construction; the path fields depend on
/// the owning client's folder and are recomputed through [`Document::rebind`]
/// whenever that folder becomes known.
#[derive(Debug, Clone)]
pub struct Document {
    pub document_id: String,
    pub client_name: String,
    pub file_section: String,
    pub document_type: String,
    pub description: String,
    pub year: String,
    pub document_date: String,
    pub file_size: String,
    pub file_type: String,
    pub category: Category,

    pub status: DocumentStatus,
    pub status_description: String,
    pub download_time: String,

    min_downloadable_year: i32,
    name_without_id: String,
    name_with_id: String,
    folder_path: Option<PathBuf>,
    file_path: Option<PathBuf>,
    file_exists: bool,
}

impl Document {
    pub fn new(fields: DocumentFields, min_downloadable_year: i32) -> Self {
        let category = classify(
            &fields.file_section,
            &fields.document_type,
            &fields.description,
        );
        let name_without_id = derive_name_without_id(&fields);
        let name_with_id = insert_id_before_extension(&name_without_id, &fields.document_id);

        Document {
            document_id: fields.document_id,
            client_name: fields.client_name,
            file_section: fields.file_section,
            document_type: fields.document_type,
            description: fields.description,
            year: fields.year,
            document_date: fields.document_date,
            file_size: fields.file_size,
            file_type: fields.file_type,
            category,
            status: DocumentStatus::Pending,
            status_description: String::new(),
            download_time: String::new(),
            min_downloadable_year,
            name_without_id,
            name_with_id,
            folder_path: None,
            file_path: None,
            file_exists: false,
        }
    }

    /// Canonical filename without the document id suffix,
    /// `ClientName_Year_DocumentType_Description.ext`.
    pub fn canonical_name_without_id(&self) -> &str {
        &self.name_without_id
    }

    /// Canonical filename with `_{document_id}` spliced in before the extension.
    pub fn canonical_name_with_id(&self) -> &str {
        &self.name_with_id
    }

    /// Target folder, `{client_folder}/{category}` or
    /// `{client_folder}/{category}/{year}`. `None` until the owning client's
    /// folder tree is initialized.
    pub fn folder_path(&self) -> Option<&Path> {
        self.folder_path.as_deref()
    }

    /// Full target file path, `{folder_path}/{canonical_name_with_id}`.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Whether the target file was present on disk at the last rebind.
    pub fn file_already_exists(&self) -> bool {
        self.file_exists
    }

    /// A document is downloadable when it has no year, or its year parses as
    /// an integer at or above the cutoff. Non-integer years are skipped.
    pub fn is_downloadable(&self) -> bool {
        let year = self.year.trim();
        if year.is_empty() {
            return true;
        }
        match year.parse::<i32>() {
            Ok(y) => y >= self.min_downloadable_year,
            Err(_) => false,
        }
    }

    /// Whether an export action should be performed for this document.
    pub fn should_execute(&self, redownload_if_exists: bool) -> bool {
        if !self.is_downloadable() {
            return false;
        }
        if !self.file_exists {
            return true;
        }
        redownload_if_exists
    }

    /// Recompute folder path, file path and the existence flag against the
    /// owning client's folder. Called on insert into a client and again once
    /// the client's folders are initialized.
    pub fn rebind(&mut self, client_folder: Option<&Path>) {
        self.folder_path = client_folder.map(|root| {
            let year = self.year.trim();
            if year.is_empty() {
                root.join(self.category.as_str())
            } else {
                root.join(self.category.as_str()).join(year)
            }
        });
        self.file_path = self
            .folder_path
            .as_ref()
            .map(|folder| folder.join(&self.name_with_id));
        self.file_exists = self
            .file_path
            .as_ref()
            .map(|p| p.is_file())
            .unwrap_or(false);
    }

    /// Record the download outcome; stamps the current time when none is given.
    pub fn set_status(&mut self, status: DocumentStatus, description: &str, time: Option<String>) {
        self.status = status;
        self.status_description = description.to_string();
        self.download_time = time.unwrap_or_else(timestamp_now);
    }
}

/// Client aggregate: identity, folder lifecycle and the owned document set.
#[derive(Debug)]
pub struct Client {
    pub client_name: String,
    pub client_number: String,
    /// Sanitized name of the client's folder under the base directory
    pub folder_name: String,
    /// Expected document count from the portal's count badge
    pub max_total_documents: usize,
    base_dir: PathBuf,
    folder_path: Option<PathBuf>,
    documents: Vec<Document>,
}

impl Client {
    pub fn new(client_name: &str, client_number: &str, base_dir: impl Into<PathBuf>) -> Self {
        let folder_name = sanitize_name(&format!("{} - {}", client_number, client_name));
        Client {
            client_name: client_name.to_string(),
            client_number: client_number.to_string(),
            folder_name,
            max_total_documents: 0,
            base_dir: base_dir.into(),
            folder_path: None,
            documents: Vec::new(),
        }
    }

    /// Set only after `initialize_folders` fully succeeds.
    pub fn folder_path(&self) -> Option<&Path> {
        self.folder_path.as_deref()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn find_document_mut(&mut self, document_id: &str) -> Option<&mut Document> {
        self.documents
            .iter_mut()
            .find(|d| d.document_id == document_id)
    }

    pub fn find_document(&self, document_id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.document_id == document_id)
    }

    /// Insert a document, keyed by `document_id`. A duplicate id is a no-op
    /// (the first insert wins); returns whether the document was stored.
    pub fn add_document(&mut self, mut document: Document) -> bool {
        if self
            .documents
            .iter()
            .any(|d| d.document_id == document.document_id)
        {
            return false;
        }
        document.rebind(self.folder_path.as_deref());
        self.documents.push(document);
        true
    }

    /// Create the client folder and every category subfolder.
    ///
    /// All-or-nothing from the caller's perspective: `folder_path` is set
    /// only when both phases succeed, and reset to unset on any failure.
    /// Directories already created on disk are not rolled back.
    pub fn initialize_folders(&mut self) -> Result<(), FolderCreationError> {
        if self.folder_name.is_empty() {
            return Err(FolderCreationError("client folder name is empty".into()));
        }

        let root = self.base_dir.join(&self.folder_name);
        std::fs::create_dir_all(&root).map_err(|e| {
            FolderCreationError(format!(
                "cannot create client folder {}: {}",
                root.display(),
                e
            ))
        })?;

        for category in Category::all() {
            let category_path = root.join(category.as_str());
            if let Err(e) = std::fs::create_dir_all(&category_path) {
                self.folder_path = None;
                return Err(FolderCreationError(format!(
                    "cannot create category folder {}: {}",
                    category_path.display(),
                    e
                )));
            }
        }

        debug!(client = %self.client_name, folder = %root.display(), "initialized client folders");
        self.folder_path = Some(root);

        // Folder is known now, re-derive every owned document's paths
        for document in &mut self.documents {
            document.rebind(self.folder_path.as_deref());
        }
        Ok(())
    }

    /// Create `{folder}/{category}/{year}` on demand, creating the category
    /// folder first if missing.
    pub fn create_year_folder(
        &self,
        category: Category,
        year: &str,
    ) -> Result<PathBuf, FolderCreationError> {
        let year = year.trim();
        let root = self.folder_path.as_ref().ok_or_else(|| {
            FolderCreationError("client folders are not initialized".into())
        })?;
        if year.is_empty() {
            return Err(FolderCreationError("year is empty".into()));
        }

        let year_path = root.join(category.as_str()).join(year);
        std::fs::create_dir_all(&year_path).map_err(|e| {
            FolderCreationError(format!(
                "cannot create year folder {}: {}",
                year_path.display(),
                e
            ))
        })?;
        Ok(year_path)
    }

    /// Number of owned documents downloaded successfully.
    pub fn count_downloaded(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Success)
            .count()
    }
}

/// `ClientName_Year_DocumentType_Description.ext`, skipping empty fields,
/// with forbidden filesystem characters stripped.
fn derive_name_without_id(fields: &DocumentFields) -> String {
    let mut items: Vec<&str> = Vec::new();
    for value in [
        fields.client_name.as_str(),
        fields.year.as_str(),
        fields.document_type.as_str(),
        fields.description.as_str(),
    ] {
        if !value.is_empty() {
            items.push(value);
        }
    }

    let stem: String = items
        .join("_")
        .chars()
        .filter(|c| !FORBIDDEN_NAME_CHARS.contains(c))
        .collect();
    let ext = if fields.file_type.is_empty() {
        "pdf"
    } else {
        fields.file_type.as_str()
    };
    format!("{}.{}", stem, ext)
}

/// Splice `_{id}` in before the file extension: `name.pdf` -> `name_{id}.pdf`.
pub fn insert_id_before_extension(file_name: &str, id: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{}.{}", stem, id, ext),
        None => format!("{}_{}", file_name, id),
    }
}

/// Strip characters that are unsafe in folder names.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN_NAME_CHARS.contains(c))
        .collect()
}

/// Timestamp in the ledger's `YYYY-MM-DD HH:MM:SS` format.
pub fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fields(id: &str) -> DocumentFields {
        DocumentFields {
            document_id: id.to_string(),
            client_name: "Acme Corp".to_string(),
            file_section: "Bookkeeping".to_string(),
            document_type: "Invoice".to_string(),
            description: "Q1".to_string(),
            year: "2020".to_string(),
            document_date: "01/15/2020".to_string(),
            file_size: "120 KB".to_string(),
            file_type: "pdf".to_string(),
        }
    }

    #[test]
    fn test_canonical_names() {
        let doc = Document::new(fields("D100"), 2018);
        assert_eq!(doc.canonical_name_without_id(), "Acme Corp_2020_Invoice_Q1.pdf");
        assert_eq!(
            doc.canonical_name_with_id(),
            "Acme Corp_2020_Invoice_Q1_D100.pdf"
        );
    }

    #[test]
    fn test_name_skips_empty_fields_and_defaults_extension() {
        let mut f = fields("D1");
        f.year = String::new();
        f.description = String::new();
        f.file_type = String::new();
        let doc = Document::new(f, 2018);
        assert_eq!(doc.canonical_name_without_id(), "Acme Corp_Invoice.pdf");
    }

    #[test]
    fn test_name_strips_forbidden_characters() {
        let mut f = fields("D1");
        f.description = r#"Q1/Q2: "final"?"#.to_string();
        let doc = Document::new(f, 2018);
        assert!(!doc
            .canonical_name_without_id()
            .contains(|c| FORBIDDEN_NAME_CHARS.contains(&c)));
        assert_eq!(
            doc.canonical_name_without_id(),
            "Acme Corp_2020_Invoice_Q1Q2 final.pdf"
        );
    }

    #[test]
    fn test_naming_is_idempotent() {
        let doc = Document::new(fields("D100"), 2018);
        let again = Document::new(fields("D100"), 2018);
        assert_eq!(doc.canonical_name_with_id(), again.canonical_name_with_id());

        // A no-op rebind does not change the derived path
        let tmp = TempDir::new().unwrap();
        let mut client = Client::new("Acme Corp", "C7", tmp.path());
        client.initialize_folders().unwrap();
        let mut doc = Document::new(fields("D100"), 2018);
        doc.rebind(client.folder_path());
        let first = doc.file_path().unwrap().to_path_buf();
        doc.rebind(client.folder_path());
        assert_eq!(doc.file_path().unwrap(), first);
    }

    #[test]
    fn test_downloadability_boundary() {
        let make = |year: &str| {
            let mut f = fields("D1");
            f.year = year.to_string();
            Document::new(f, 2018)
        };
        assert!(make("2018").is_downloadable());
        assert!(!make("2017").is_downloadable());
        assert!(make("").is_downloadable());
        assert!(!make("abc").is_downloadable());
    }

    #[test]
    fn test_should_execute_respects_redownload_flag() {
        let tmp = TempDir::new().unwrap();
        let mut client = Client::new("Acme Corp", "C7", tmp.path());
        client.initialize_folders().unwrap();

        let mut doc = Document::new(fields("D100"), 2018);
        doc.rebind(client.folder_path());
        assert!(doc.should_execute(false));

        // Materialize the target file, then rebind to pick it up
        let file_path = doc.file_path().unwrap().to_path_buf();
        std::fs::create_dir_all(file_path.parent().unwrap()).unwrap();
        std::fs::write(&file_path, b"pdf").unwrap();
        doc.rebind(client.folder_path());
        assert!(doc.file_already_exists());
        assert!(!doc.should_execute(false));
        assert!(doc.should_execute(true));
    }

    #[test]
    fn test_folder_path_includes_year_and_category() {
        let tmp = TempDir::new().unwrap();
        let mut client = Client::new("Acme Corp", "C7", tmp.path());
        client.initialize_folders().unwrap();

        let mut doc = Document::new(fields("D100"), 2018);
        doc.rebind(client.folder_path());
        let expected = tmp
            .path()
            .join("C7 - Acme Corp")
            .join("Accounting & Payroll")
            .join("2020")
            .join("Acme Corp_2020_Invoice_Q1_D100.pdf");
        assert_eq!(doc.file_path().unwrap(), expected);

        // No year: path stops at the category folder
        let mut f = fields("D101");
        f.year = String::new();
        let mut doc = Document::new(f, 2018);
        doc.rebind(client.folder_path());
        assert_eq!(
            doc.folder_path().unwrap(),
            tmp.path().join("C7 - Acme Corp").join("Accounting & Payroll")
        );
    }

    #[test]
    fn test_duplicate_document_ids_are_suppressed() {
        let tmp = TempDir::new().unwrap();
        let mut client = Client::new("Acme Corp", "C7", tmp.path());
        let mut second = fields("D100");
        second.description = "Other description".to_string();

        assert!(client.add_document(Document::new(fields("D100"), 2018)));
        assert!(!client.add_document(Document::new(second, 2018)));
        assert_eq!(client.documents().len(), 1);
        // First insert wins
        assert_eq!(client.documents()[0].description, "Q1");
    }

    #[test]
    fn test_folder_init_is_atomic() {
        let tmp = TempDir::new().unwrap();
        let mut client = Client::new("Acme Corp", "C7", tmp.path());

        // A file squatting on a category folder name makes phase two fail
        let root = tmp.path().join("C7 - Acme Corp");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("Tax"), b"not a folder").unwrap();

        assert!(client.initialize_folders().is_err());
        assert!(client.folder_path().is_none());
    }

    #[test]
    fn test_create_year_folder_requires_initialized_client() {
        let tmp = TempDir::new().unwrap();
        let mut client = Client::new("Acme Corp", "C7", tmp.path());
        assert!(client.create_year_folder(Category::Tax, "2020").is_err());

        client.initialize_folders().unwrap();
        assert!(client.create_year_folder(Category::Tax, "").is_err());
        let path = client.create_year_folder(Category::Tax, "2020").unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn test_count_downloaded() {
        let tmp = TempDir::new().unwrap();
        let mut client = Client::new("Acme Corp", "C7", tmp.path());
        client.add_document(Document::new(fields("D1"), 2018));
        client.add_document(Document::new(fields("D2"), 2018));
        client
            .find_document_mut("D1")
            .unwrap()
            .set_status(DocumentStatus::Success, "ok", None);
        assert_eq!(client.count_downloaded(), 1);
    }

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_name(r#"A/B\C:D*E?F"G<H>I|J"#), "ABCDEFGHIJ");
        let client = Client::new("Acme: Corp?", "C7", "/tmp");
        assert_eq!(client.folder_name, "C7 - Acme Corp");
    }

    #[test]
    fn test_insert_id_before_extension() {
        assert_eq!(insert_id_before_extension("a_b.pdf", "X1"), "a_b_X1.pdf");
        assert_eq!(insert_id_before_extension("noext", "X1"), "noext_X1");
    }
}
