//! Download staging directory: polling, relocation and archive handling
//!
//! The browser drops everything into one staging directory. The protocol
//! relies on at most one in-flight download at a time, so completion is
//! detected by polling for a file without a partial-download suffix.

use crate::errors::StagingError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Suffixes the browser uses for in-progress downloads.
const PARTIAL_SUFFIXES: [&str; 2] = [".crdownload", ".tmp"];

/// Subfolder where consumed listing CSVs are archived.
const CSV_STORE: &str = "0_csv_";
/// Subfolder where bulk-export zips are extracted per client.
const ZIP_STORE: &str = "0_zip_";

pub struct Staging {
    dir: PathBuf,
    poll_interval: Duration,
}

impl Staging {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Staging {
            dir: dir.into(),
            poll_interval,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn csv_store_dir(&self) -> PathBuf {
        self.dir.join(CSV_STORE)
    }

    pub fn zip_store_dir(&self) -> PathBuf {
        self.dir.join(ZIP_STORE)
    }

    /// Create the staging directory and its storage subfolders.
    pub fn ensure_layout(&self) -> Result<(), StagingError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::create_dir_all(self.csv_store_dir())?;
        std::fs::create_dir_all(self.zip_store_dir())?;
        Ok(())
    }

    /// Wait until a completed download (optionally with the given extension)
    /// appears in the staging directory, polling until the timeout elapses.
    pub async fn wait_for_download(
        &self,
        extension: Option<&str>,
        timeout: Duration,
    ) -> Result<PathBuf, StagingError> {
        debug!(
            "Waiting for download in {} (timeout {}s)",
            self.dir.display(),
            timeout.as_secs()
        );
        let started = Instant::now();

        while started.elapsed() < timeout {
            // A partial file means the browser is still writing
            if self.has_partial_files()? {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let mut candidates: Vec<PathBuf> = self
                .completed_files()?
                .into_iter()
                .filter(|p| match extension {
                    Some(ext) => p
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.ends_with(ext))
                        .unwrap_or(false),
                    None => true,
                })
                .collect();

            if !candidates.is_empty() {
                // Newest file wins when stale leftovers are present
                candidates.sort_by_key(|p| {
                    std::fs::metadata(p)
                        .and_then(|m| m.modified())
                        .unwrap_or(std::time::UNIX_EPOCH)
                });
                let latest = candidates.pop().expect("non-empty candidates");
                info!("Download complete: {}", latest.display());
                return Ok(latest);
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        Err(StagingError::Timeout {
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Completed (non-partial) regular files at the top level of staging.
    pub fn completed_files(&self) -> Result<Vec<PathBuf>, StagingError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }
            files.push(path);
        }
        Ok(files)
    }

    /// Enforce the one-download-at-a-time invariant: exactly one completed
    /// file may sit in staging after an export click.
    pub fn assert_single_file(&self) -> Result<(), StagingError> {
        let count = self.completed_files()?.len();
        if count > 1 {
            return Err(StagingError::AmbiguousState { count });
        }
        Ok(())
    }

    fn has_partial_files(&self) -> Result<bool, StagingError> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if path.is_file() && PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delete every top-level file in staging, keeping subfolders.
    pub fn clean(&self) -> Result<usize, StagingError> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Could not remove staged file {}: {}", path.display(), e);
                } else {
                    removed += 1;
                }
            }
        }
        debug!("Removed {} files from staging", removed);
        Ok(removed)
    }
}

/// Move a file, creating the destination's parent directories as needed.
pub fn move_file(source: &Path, destination: &Path) -> Result<(), StagingError> {
    if !source.exists() {
        return Err(StagingError::FileNotFound(source.display().to_string()));
    }
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // rename fails across filesystems; fall back to copy + remove
    match std::fs::rename(source, destination) {
        Ok(()) => {}
        Err(_) => {
            std::fs::copy(source, destination)?;
            std::fs::remove_file(source)?;
        }
    }
    debug!("Moved {} -> {}", source.display(), destination.display());
    Ok(())
}

pub fn remove_file(path: &Path) -> Result<(), StagingError> {
    if !path.exists() {
        return Err(StagingError::FileNotFound(path.display().to_string()));
    }
    std::fs::remove_file(path)?;
    Ok(())
}

/// Extract a zip archive into the destination directory.
pub fn extract_zip(zip_path: &Path, dest_dir: &Path) -> Result<(), StagingError> {
    std::fs::create_dir_all(dest_dir)?;
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(dest_dir)?;
    info!(
        "Extracted {} ({} entries) into {}",
        zip_path.display(),
        archive.len(),
        dest_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn staging(tmp: &TempDir) -> Staging {
        Staging::new(tmp.path(), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_wait_finds_completed_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("report.pdf"), b"pdf").unwrap();

        let found = staging(&tmp)
            .wait_for_download(None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(found.file_name().unwrap(), "report.pdf");
    }

    #[tokio::test]
    async fn test_wait_filters_by_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("listing.csv"), b"a,b").unwrap();

        let err = staging(&tmp)
            .wait_for_download(Some(".zip"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::Timeout { .. }));

        std::fs::write(tmp.path().join("bundle.zip"), b"zip").unwrap();
        let found = staging(&tmp)
            .wait_for_download(Some(".zip"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(found.file_name().unwrap(), "bundle.zip");
    }

    #[tokio::test]
    async fn test_partial_download_is_not_complete() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("report.pdf.crdownload"), b"...").unwrap();

        let err = staging(&tmp)
            .wait_for_download(None, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::Timeout { .. }));
    }

    #[test]
    fn test_single_file_invariant() {
        let tmp = TempDir::new().unwrap();
        let s = staging(&tmp);
        s.assert_single_file().unwrap();

        std::fs::write(tmp.path().join("a.pdf"), b"a").unwrap();
        s.assert_single_file().unwrap();

        std::fs::write(tmp.path().join("b.pdf"), b"b").unwrap();
        let err = s.assert_single_file().unwrap_err();
        assert!(matches!(err, StagingError::AmbiguousState { count: 2 }));
    }

    #[test]
    fn test_clean_keeps_subfolders() {
        let tmp = TempDir::new().unwrap();
        let s = staging(&tmp);
        s.ensure_layout().unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"a").unwrap();
        std::fs::write(tmp.path().join("b.pdf"), b"b").unwrap();

        let removed = s.clean().unwrap();
        assert_eq!(removed, 2);
        assert!(s.csv_store_dir().is_dir());
        assert!(s.zip_store_dir().is_dir());
        assert!(s.completed_files().unwrap().is_empty());
    }

    #[test]
    fn test_move_file_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.pdf");
        std::fs::write(&src, b"a").unwrap();
        let dst = tmp.path().join("deep").join("nested").join("a.pdf");

        move_file(&src, &dst).unwrap();
        assert!(dst.is_file());
        assert!(!src.exists());
    }

    #[test]
    fn test_extract_zip_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("bundle.zip");

        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        writer.start_file("doc_D1.pdf", options).unwrap();
        writer.write_all(b"pdf contents").unwrap();
        writer.finish().unwrap();

        let dest = tmp.path().join("out");
        extract_zip(&zip_path, &dest).unwrap();
        assert!(dest.join("doc_D1.pdf").is_file());
    }
}
