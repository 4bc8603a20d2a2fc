//! Export run orchestration
//!
//! Drives the portal session through the per-client export protocol: search,
//! folder setup, listing export, then page-by-page document export with bulk
//! zip downloads and a per-row fallback. Progress is written back to the
//! ledger after every client so an interrupted run can resume from the
//! remaining Pending rows.

use crate::config::Config;
use crate::errors::{ExportError, StagingError};
use crate::ledger::Ledger;
use crate::listing::parse_listing;
use crate::models::{Client, ClientStatus, Document, DocumentStatus};
use crate::notify::Notifier;
use crate::portal::{ExportClick, PageAdvance, PortalDriver, SearchOutcome};
use crate::staging::{extract_zip, move_file, remove_file, Staging};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Aggregate result of one run over the pending client queue.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub warned: usize,
    pub failed: usize,
    /// Whether the run halted early on consecutive failures
    pub halted: bool,
}

/// Terminal outcome of one client's export.
struct ClientOutcome {
    status: ClientStatus,
    description: String,
    total_documents: usize,
    files_downloaded: usize,
    folder_path: String,
}

/// A failed client export, carrying whatever progress was made before the
/// failure so the ledger row keeps its real counts.
struct ClientFailure {
    error: ExportError,
    total_documents: usize,
    files_downloaded: usize,
    folder_path: String,
}

impl ClientFailure {
    /// Failure before any documents were resolved.
    fn early(error: ExportError) -> Self {
        ClientFailure {
            error,
            total_documents: 0,
            files_downloaded: 0,
            folder_path: String::new(),
        }
    }
}

pub struct Orchestrator<D: PortalDriver, N: Notifier> {
    driver: D,
    notifier: N,
    staging: Staging,
    ledger: Ledger,
    config: Config,
}

impl<D: PortalDriver, N: Notifier> Orchestrator<D, N> {
    pub fn new(driver: D, notifier: N, ledger: Ledger, config: Config) -> Self {
        let staging = Staging::new(&config.download_dir, config.poll_interval());
        Orchestrator {
            driver,
            notifier,
            staging,
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Process every Pending client on the ledger, in list order.
    ///
    /// Client failures are recorded and the run moves on; a streak of
    /// `max_consecutive_errors` failed clients halts the run and raises an
    /// operator notification.
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.staging.ensure_layout()?;
        info!("Staging directory: {}", self.staging.dir().display());

        let queue = self.ledger.pending_clients();
        info!("Starting export run: {} pending clients", queue.len());

        let mut summary = RunSummary::default();
        let mut consecutive_errors: u32 = 0;

        for (client_name, client_number) in queue {
            // Leftovers from a previous client would confuse download polling
            self.staging.clean()?;

            self.ledger.update_client(
                &client_name,
                &client_number,
                ClientStatus::InProgress,
                "",
                0,
                0,
                "",
            );

            summary.processed += 1;
            match self.process_client(&client_name, &client_number).await {
                Ok(outcome) => {
                    consecutive_errors = 0;
                    match outcome.status {
                        ClientStatus::Warning => summary.warned += 1,
                        _ => summary.succeeded += 1,
                    }
                    info!(
                        client = %client_name,
                        status = outcome.status.as_str(),
                        "{}", outcome.description
                    );
                    self.ledger.update_client(
                        &client_name,
                        &client_number,
                        outcome.status,
                        &outcome.description,
                        outcome.total_documents,
                        outcome.files_downloaded,
                        &outcome.folder_path,
                    );
                }
                Err(failure) => {
                    consecutive_errors += 1;
                    summary.failed += 1;
                    error!(client = %client_name, "Client export failed: {}", failure.error);
                    if let ExportError::Portal(p) = &failure.error {
                        if p.is_web_error() {
                            warn!("Transient web error; reset the row to Pending to retry this client");
                        }
                    }
                    self.ledger.update_client(
                        &client_name,
                        &client_number,
                        ClientStatus::Error,
                        &failure.error.to_string(),
                        failure.total_documents,
                        failure.files_downloaded,
                        &failure.folder_path,
                    );
                }
            }

            self.ledger
                .save(&self.config.client_list_path, &self.config.document_log_path)?;

            if consecutive_errors >= self.config.export.max_consecutive_errors {
                let message = format!(
                    "{} clients failed in a row, last failure on '{} | {}'",
                    consecutive_errors, client_name, client_number
                );
                error!("{}, halting run", message);
                self.notifier
                    .critical_error(consecutive_errors, &message)
                    .await;
                summary.halted = true;
                break;
            }

            tokio::time::sleep(self.config.inter_client_pause()).await;
        }

        info!(
            "Run finished: {} processed, {} succeeded, {} with warnings, {} failed",
            summary.processed, summary.succeeded, summary.warned, summary.failed
        );
        Ok(summary)
    }

    /// The per-client state machine.
    async fn process_client(
        &mut self,
        client_name: &str,
        client_number: &str,
    ) -> Result<ClientOutcome, ClientFailure> {
        info!(client = %client_name, number = %client_number, "Processing client");

        let document_count = match self
            .driver
            .search_client(client_name, client_number)
            .await
            .map_err(|e| ClientFailure::early(e.into()))?
        {
            SearchOutcome::NotFound => {
                return Err(ClientFailure::early(ExportError::ClientNotFound {
                    client_name: client_name.to_string(),
                    client_number: client_number.to_string(),
                }))
            }
            SearchOutcome::Found { document_count } => document_count,
        };

        if document_count == 0 {
            return Ok(ClientOutcome {
                status: ClientStatus::Success,
                description: "Client has no documents".to_string(),
                total_documents: 0,
                files_downloaded: 0,
                folder_path: String::new(),
            });
        }

        let mut client = Client::new(client_name, client_number, &self.config.download_dir);
        client.max_total_documents = document_count;

        if let Err(error) = self.export_documents(&mut client).await {
            return Err(ClientFailure {
                error,
                total_documents: client.max_total_documents,
                files_downloaded: client.count_downloaded(),
                folder_path: client
                    .folder_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            });
        }

        let downloaded = client.count_downloaded();
        let (status, description) = if downloaded == client.max_total_documents {
            (
                ClientStatus::Success,
                format!("Downloaded {}/{} files", downloaded, client.max_total_documents),
            )
        } else {
            (
                ClientStatus::Warning,
                format!("Downloaded {}/{} files", downloaded, client.max_total_documents),
            )
        };

        Ok(ClientOutcome {
            status,
            description,
            total_documents: client.max_total_documents,
            files_downloaded: downloaded,
            folder_path: client
                .folder_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        })
    }

    /// Folder setup, listing ingest and the page-by-page export loop.
    async fn export_documents(&mut self, client: &mut Client) -> Result<(), ExportError> {
        client.initialize_folders()?;
        self.ingest_listing(client).await?;

        let total_pages = div_ceil(client.max_total_documents, self.config.export.items_per_page);
        debug!(
            "{} documents across {} pages of {}",
            client.max_total_documents, total_pages, self.config.export.items_per_page
        );

        for page in 1..=total_pages {
            if self.driver.is_on_login_page().await? {
                return Err(ExportError::SessionExpired);
            }

            self.process_page(client, page).await?;

            if page < total_pages {
                match self.driver.next_page().await? {
                    PageAdvance::Advanced => {}
                    PageAdvance::Disabled | PageAdvance::Absent => {
                        warn!(
                            "Pager stopped after page {} of {} for '{}'",
                            page, total_pages, client.client_name
                        );
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Export the document listing CSV, ingest its rows into the client and
    /// the ledger, and archive the consumed file.
    async fn ingest_listing(&mut self, client: &mut Client) -> Result<(), ExportError> {
        self.driver.export_listing().await?;
        let listing_path = self
            .staging
            .wait_for_download(Some(".csv"), self.config.download_timeout())
            .await?;
        self.staging.assert_single_file()?;

        let rows = parse_listing(&listing_path, &client.client_number)?;
        if rows.is_empty() {
            return Err(ExportError::ListingEmpty(listing_path.display().to_string()));
        }

        let redownload = self.config.export.redownload_if_exists;
        let client_number = client.client_number.clone();
        for fields in rows {
            let document = Document::new(fields, self.config.export.min_downloadable_year);
            let document_id = document.document_id.clone();
            if !client.add_document(document) {
                continue;
            }

            // add_document rebinds paths, so existence is now known
            let doc = client
                .find_document_mut(&document_id)
                .expect("document was just inserted");
            if doc.file_already_exists() && !redownload {
                doc.set_status(DocumentStatus::Success, "File already exists", None);
            } else if !doc.should_execute(redownload) {
                doc.set_status(DocumentStatus::Warning, "Skipped, year before cutoff", None);
            }

            let doc = client
                .find_document(&document_id)
                .expect("document was just inserted");
            self.ledger.seed_document(&client_number, doc);
            if doc.status != DocumentStatus::Pending {
                self.record_outcome(&client_number, doc);
            }
        }

        let archived = self
            .staging
            .csv_store_dir()
            .join(format!("{}_listing.csv", client.client_number));
        move_file(&listing_path, &archived)?;
        Ok(())
    }

    /// Export the documents listed on the current result page.
    async fn process_page(&mut self, client: &mut Client, page: usize) -> Result<(), ExportError> {
        let page_ids = self.driver.page_document_ids().await?;

        let actionable: Vec<(usize, String)> = page_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| {
                client
                    .find_document(id)
                    .map(|d| d.status == DocumentStatus::Pending)
                    .unwrap_or_else(|| {
                        warn!("Page row '{}' is not in the listing, skipping", id);
                        false
                    })
            })
            .map(|(i, id)| (i, id.clone()))
            .collect();

        if actionable.is_empty() {
            debug!("Page {}: nothing to export", page);
            return Ok(());
        }

        if actionable.len() == 1 {
            let (row, id) = &actionable[0];
            self.export_one_row(client, *row, id).await?;
            return Ok(());
        }

        match self.download_bulk_zip().await {
            Ok(Some(zip_path)) => self.handle_bulk_zip(client, page, &zip_path, &actionable)?,
            Ok(None) => {
                // Bulk export control is disabled, fall back to row exports
                info!("Bulk export unavailable on page {}, exporting row by row", page);
                for (row, id) in &actionable {
                    self.export_one_row(client, *row, id).await?;
                }
            }
            // A zip timeout is fatal for this page only; the documents are
            // marked and the client outcome settles on count_downloaded()
            Err(ExportError::DownloadTimeout { attempts }) => {
                warn!(
                    "Bulk download timed out on page {}, marking its documents and moving on",
                    page
                );
                let client_number = client.client_number.clone();
                for (_, id) in &actionable {
                    let doc = client
                        .find_document_mut(id)
                        .expect("actionable ids come from the document set");
                    doc.set_status(
                        DocumentStatus::Error,
                        &format!("Download timed out after {} attempts", attempts),
                        None,
                    );
                    let doc = client
                        .find_document(id)
                        .expect("actionable ids come from the document set");
                    self.record_outcome(&client_number, doc);
                }
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Click the bulk export control and wait for the zip, retrying the whole
    /// click-and-wait on download timeouts. `None` means the control is
    /// disabled on this page.
    async fn download_bulk_zip(&mut self) -> Result<Option<PathBuf>, ExportError> {
        let attempts = self.config.export.download_retry_count.max(1);
        for attempt in 1..=attempts {
            match self.driver.bulk_export_page().await? {
                ExportClick::Disabled => return Ok(None),
                ExportClick::Accepted => {}
            }
            match self
                .staging
                .wait_for_download(Some(".zip"), self.config.zip_download_timeout())
                .await
            {
                Ok(path) => {
                    self.staging.assert_single_file()?;
                    return Ok(Some(path));
                }
                Err(StagingError::Timeout { .. }) if attempt < attempts => {
                    warn!("Bulk download timed out (attempt {}/{}), retrying", attempt, attempts);
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(StagingError::Timeout { .. }) => {
                    return Err(ExportError::DownloadTimeout { attempts })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExportError::DownloadTimeout { attempts })
    }

    /// Extract a bulk zip and place each entry at its document's target path.
    ///
    /// Entries are matched to documents by id substring, then verified against
    /// the exact expected filename. A name mismatch marks the document Error
    /// and leaves the extracted file where it is for manual inspection.
    fn handle_bulk_zip(
        &mut self,
        client: &mut Client,
        page: usize,
        zip_path: &Path,
        actionable: &[(usize, String)],
    ) -> Result<(), ExportError> {
        let extract_dir = self
            .staging
            .zip_store_dir()
            .join(format!("{}_page{}", client.client_number, page));
        extract_zip(zip_path, &extract_dir)?;

        let archived = self
            .staging
            .zip_store_dir()
            .join(format!("{}_page{}.zip", client.client_number, page));
        move_file(zip_path, &archived)?;

        for entry in WalkDir::new(&extract_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let matched = actionable
                .iter()
                .find(|(_, id)| file_name.contains(id.as_str()))
                .map(|(_, id)| id.clone());

            let Some(document_id) = matched else {
                warn!("Extracted file '{}' matches no exported document", file_name);
                continue;
            };
            let client_number = client.client_number.clone();
            let (expected_name, target, category, year) = {
                let doc = client
                    .find_document(&document_id)
                    .expect("actionable ids come from the document set");
                (
                    doc.canonical_name_with_id().to_string(),
                    doc.file_path()
                        .expect("paths are bound after folder initialization")
                        .to_path_buf(),
                    doc.category,
                    doc.year.clone(),
                )
            };

            let (status, description) = if file_name.eq_ignore_ascii_case(&expected_name) {
                if !year.trim().is_empty() {
                    client.create_year_folder(category, &year)?;
                }
                move_file(entry.path(), &target)?;
                (
                    DocumentStatus::Success,
                    "File downloaded successfully".to_string(),
                )
            } else {
                warn!(
                    "Exported file '{}' does not match expected name '{}'",
                    file_name, expected_name
                );
                (
                    DocumentStatus::Error,
                    format!("Exported file name mismatch: got '{}'", file_name),
                )
            };

            let doc = client
                .find_document_mut(&document_id)
                .expect("actionable ids come from the document set");
            doc.set_status(status, &description, None);
            let doc = client
                .find_document(&document_id)
                .expect("actionable ids come from the document set");
            self.record_outcome(&client_number, doc);
        }

        // Anything still Pending did not come back in the archive
        let client_number = client.client_number.clone();
        for (_, id) in actionable {
            let doc = client
                .find_document_mut(id)
                .expect("actionable ids come from the document set");
            if doc.status == DocumentStatus::Pending {
                doc.set_status(DocumentStatus::Error, "File missing from export archive", None);
                let doc = client
                    .find_document(id)
                    .expect("actionable ids come from the document set");
                self.record_outcome(&client_number, doc);
            }
        }
        Ok(())
    }

    /// Export a single row and place the downloaded file. Row failures mark
    /// the document and never abort the client.
    async fn export_one_row(
        &mut self,
        client: &mut Client,
        row: usize,
        document_id: &str,
    ) -> Result<(), ExportError> {
        let client_number = client.client_number.clone();
        let outcome = self.download_row_file(row).await;

        let (expected_name, target, category, year) = {
            let doc = client
                .find_document(document_id)
                .expect("actionable ids come from the document set");
            (
                doc.canonical_name_without_id().to_string(),
                doc.file_path()
                    .expect("paths are bound after folder initialization")
                    .to_path_buf(),
                doc.category,
                doc.year.clone(),
            )
        };

        let (status, description) = match outcome {
            Ok(Some(staged_path)) => {
                // One download at a time; a second completed file means the
                // staging dir is in an unknown state
                if let Err(e) = self.staging.assert_single_file() {
                    remove_file(&staged_path)?;
                    return Err(e.into());
                }
                let staged_name = staged_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if staged_name.eq_ignore_ascii_case(&expected_name) {
                    if !year.trim().is_empty() {
                        client.create_year_folder(category, &year)?;
                    }
                    // The target filename carries the id, so the move renames
                    move_file(&staged_path, &target)?;
                    (
                        DocumentStatus::Success,
                        "File downloaded successfully".to_string(),
                    )
                } else {
                    warn!(
                        "Downloaded file '{}' does not match expected name '{}', removing it",
                        staged_name, expected_name
                    );
                    remove_file(&staged_path)?;
                    (
                        DocumentStatus::Error,
                        format!("Downloaded file name mismatch: got '{}'", staged_name),
                    )
                }
            }
            Ok(None) => (
                DocumentStatus::Error,
                "Row export control disabled".to_string(),
            ),
            Err(ExportError::DownloadTimeout { attempts }) => (
                DocumentStatus::Error,
                format!("Download timed out after {} attempts", attempts),
            ),
            Err(e) => return Err(e),
        };

        let doc = client
            .find_document_mut(document_id)
            .expect("actionable ids come from the document set");
        doc.set_status(status, &description, None);
        let doc = client
            .find_document(document_id)
            .expect("actionable ids come from the document set");
        self.record_outcome(&client_number, doc);
        Ok(())
    }

    /// Click one row's export control and wait for its file, retrying the
    /// click-and-wait on download timeouts.
    async fn download_row_file(&mut self, row: usize) -> Result<Option<PathBuf>, ExportError> {
        let attempts = self.config.export.download_retry_count.max(1);
        for attempt in 1..=attempts {
            match self.driver.export_row(row).await? {
                ExportClick::Disabled => return Ok(None),
                ExportClick::Accepted => {}
            }
            match self
                .staging
                .wait_for_download(None, self.config.download_timeout())
                .await
            {
                Ok(path) => return Ok(Some(path)),
                Err(StagingError::Timeout { .. }) if attempt < attempts => {
                    warn!("Download timed out (attempt {}/{}), retrying", attempt, attempts);
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(StagingError::Timeout { .. }) => {
                    return Err(ExportError::DownloadTimeout { attempts })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExportError::DownloadTimeout { attempts })
    }

    fn record_outcome(&mut self, client_number: &str, doc: &Document) {
        let file_path = doc
            .file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        self.ledger.record_document(
            &doc.client_name,
            client_number,
            &doc.document_id,
            doc.status,
            &doc.status_description,
            doc.canonical_name_with_id(),
            &file_path,
            &doc.download_time,
        );
    }
}

fn div_ceil(total: usize, per_page: usize) -> usize {
    if total == 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}
