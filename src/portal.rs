//! Browser/session driver seam
//!
//! The portal is driven through a trait so the export protocol stays
//! independent of any concrete WebDriver plumbing. Expected portal responses
//! (control disabled, pager missing) are outcome variants the state machine
//! branches on; `PortalError` is reserved for real driver failures.

use crate::errors::PortalError;
use async_trait::async_trait;

/// Result of searching the portal for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    NotFound,
    /// Client found, with the portal's document-count badge
    Found { document_count: usize },
}

/// Result of clicking an export control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportClick {
    /// The export was accepted and a download has started
    Accepted,
    /// The control was present but disabled
    Disabled,
}

/// Result of trying to advance to the next result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAdvance {
    Advanced,
    Disabled,
    Absent,
}

/// Driver for the document-management portal session.
///
/// Methods are strictly sequential; the protocol never issues overlapping
/// driver calls.
#[async_trait]
pub trait PortalDriver: Send {
    /// Search for a client and read its document count.
    async fn search_client(
        &mut self,
        client_name: &str,
        client_number: &str,
    ) -> Result<SearchOutcome, PortalError>;

    /// Whether the session was redirected to the login boundary.
    async fn is_on_login_page(&mut self) -> Result<bool, PortalError>;

    /// Click the listing-export control; a CSV download starts on success.
    async fn export_listing(&mut self) -> Result<(), PortalError>;

    /// Document ids of the rows on the current page, in row order.
    async fn page_document_ids(&mut self) -> Result<Vec<String>, PortalError>;

    /// Select all rows on the page and request a bulk export
    /// (select-all, actions menu, export, confirmation).
    async fn bulk_export_page(&mut self) -> Result<ExportClick, PortalError>;

    /// Click the per-row export control for one document.
    async fn export_row(&mut self, row_index: usize) -> Result<ExportClick, PortalError>;

    /// Click the next-page control.
    async fn next_page(&mut self) -> Result<PageAdvance, PortalError>;
}

/// Connect to a portal session.
///
/// No WebDriver backend ships with this crate; deployments plug a concrete
/// [`PortalDriver`] in here.
pub fn connect() -> Result<NoBackend, PortalError> {
    Err(PortalError::Session(
        "no portal driver backend is configured in this build".to_string(),
    ))
}

/// Uninhabited stand-in driver for builds without a portal backend.
pub enum NoBackend {}

#[async_trait]
impl PortalDriver for NoBackend {
    async fn search_client(
        &mut self,
        _client_name: &str,
        _client_number: &str,
    ) -> Result<SearchOutcome, PortalError> {
        match *self {}
    }

    async fn is_on_login_page(&mut self) -> Result<bool, PortalError> {
        match *self {}
    }

    async fn export_listing(&mut self) -> Result<(), PortalError> {
        match *self {}
    }

    async fn page_document_ids(&mut self) -> Result<Vec<String>, PortalError> {
        match *self {}
    }

    async fn bulk_export_page(&mut self) -> Result<ExportClick, PortalError> {
        match *self {}
    }

    async fn export_row(&mut self, _row_index: usize) -> Result<ExportClick, PortalError> {
        match *self {}
    }

    async fn next_page(&mut self) -> Result<PageAdvance, PortalError> {
        match *self {}
    }
}
