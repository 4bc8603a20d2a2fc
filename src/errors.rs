//! Error types shared across the export pipeline

use thiserror::Error;

/// Errors surfaced by the browser/session driver.
///
/// Expected portal conditions (disabled export control, missing next-page
/// button) are modeled as outcome enums in `portal`, not as errors; these
/// variants cover genuinely exceptional driver failures.
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out waiting for element: {0}")]
    WaitTimeout(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("browser session error: {0}")]
    Session(String),
}

impl PortalError {
    /// Whether the failure is a transient web error that a caller above the
    /// orchestrator may resolve with a page reload and client-level retry.
    pub fn is_web_error(&self) -> bool {
        matches!(
            self,
            PortalError::WaitTimeout(_)
                | PortalError::ElementNotFound(_)
                | PortalError::StaleElement(_)
        )
    }
}

/// Errors from the download staging directory.
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("timed out after {timeout_secs}s waiting for a downloaded file")]
    Timeout { timeout_secs: u64 },

    #[error("{count} files present in staging directory, expected exactly one")]
    AmbiguousState { count: usize },

    #[error("file does not exist: {0}")]
    FileNotFound(String),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised when a client's folder tree cannot be created.
#[derive(Error, Debug)]
#[error("folder creation failed: {0}")]
pub struct FolderCreationError(pub String);

/// Failure of a whole client's export, recorded on the client's ledger row.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("client '{client_name} | {client_number}' not found in portal")]
    ClientNotFound {
        client_name: String,
        client_number: String,
    },

    #[error("listing does not match client: expected number '{expected}', got '{actual}'")]
    ListingMismatch { expected: String, actual: String },

    #[error("listing is missing required column '{0}'")]
    ListingColumn(String),

    #[error("listing file is empty: {0}")]
    ListingEmpty(String),

    #[error("redirected to login page mid-run, session expired")]
    SessionExpired,

    #[error("download timed out after {attempts} attempts")]
    DownloadTimeout { attempts: u32 },

    #[error(transparent)]
    FolderCreation(#[from] FolderCreationError),

    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from ledger load/save.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger file is missing required column '{0}'")]
    MissingColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
