//! Centralized configuration management for fileroom

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for downloads; the browser drops files here and the
    /// per-client folder trees are created inside it
    pub download_dir: PathBuf,
    /// Path to the client list CSV (the run's work queue)
    pub client_list_path: PathBuf,
    /// Path to the document log CSV
    pub document_log_path: PathBuf,
    /// Pagination and retry settings
    pub export: ExportConfig,
}

/// Export protocol configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Documents shown per result page by the portal
    pub items_per_page: usize,
    /// Retry attempts for a timed-out download
    pub download_retry_count: u32,
    /// Delay between download retry attempts (seconds)
    pub retry_delay_secs: u64,
    /// Timeout waiting for a single exported file (seconds)
    pub download_timeout_secs: u64,
    /// Timeout waiting for a bulk-export zip (seconds)
    pub zip_download_timeout_secs: u64,
    /// Staging directory poll interval (milliseconds)
    pub poll_interval_ms: u64,
    /// Consecutive failed clients before the run halts
    pub max_consecutive_errors: u32,
    /// Re-export documents whose target file already exists
    pub redownload_if_exists: bool,
    /// Documents with an integer year below this are skipped
    pub min_downloadable_year: i32,
    /// Pause between clients (seconds)
    pub inter_client_pause_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            items_per_page: 50,
            download_retry_count: 3,
            retry_delay_secs: 10,
            download_timeout_secs: 120,
            zip_download_timeout_secs: 300,
            poll_interval_ms: 2000,
            max_consecutive_errors: 10,
            redownload_if_exists: false,
            min_downloadable_year: 2018,
            inter_client_pause_secs: 3,
        }
    }
}

impl Config {
    /// Load configuration from a `.env` file (if present), environment
    /// variables, and defaults
    pub fn from_env() -> Result<Self> {
        // .env values become environment variables; existing env wins
        let _ = dotenvy::dotenv();

        let download_dir: PathBuf = std::env::var("FILEROOM_DOWNLOAD_DIR")
            .unwrap_or_else(|_| "./downloads".to_string())
            .into();

        let client_list_path = std::env::var("FILEROOM_CLIENT_LIST")
            .unwrap_or_else(|_| "./client_list.csv".to_string())
            .into();

        let document_log_path = std::env::var("FILEROOM_DOCUMENT_LOG")
            .unwrap_or_else(|_| "./document_log.csv".to_string())
            .into();

        let defaults = ExportConfig::default();
        let export = ExportConfig {
            items_per_page: parse_env_var("FILEROOM_ITEMS_PER_PAGE")?
                .unwrap_or(defaults.items_per_page),
            download_retry_count: parse_env_var("FILEROOM_DOWNLOAD_RETRY_COUNT")?
                .unwrap_or(defaults.download_retry_count),
            retry_delay_secs: parse_env_var("FILEROOM_RETRY_DELAY_SECS")?
                .unwrap_or(defaults.retry_delay_secs),
            download_timeout_secs: parse_env_var("FILEROOM_DOWNLOAD_TIMEOUT_SECS")?
                .unwrap_or(defaults.download_timeout_secs),
            zip_download_timeout_secs: parse_env_var("FILEROOM_ZIP_TIMEOUT_SECS")?
                .unwrap_or(defaults.zip_download_timeout_secs),
            poll_interval_ms: parse_env_var("FILEROOM_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval_ms),
            max_consecutive_errors: parse_env_var("FILEROOM_MAX_CONSECUTIVE_ERRORS")?
                .unwrap_or(defaults.max_consecutive_errors),
            redownload_if_exists: parse_env_var("FILEROOM_REDOWNLOAD_IF_EXISTS")?
                .unwrap_or(defaults.redownload_if_exists),
            min_downloadable_year: parse_env_var("FILEROOM_MIN_DOWNLOADABLE_YEAR")?
                .unwrap_or(defaults.min_downloadable_year),
            inter_client_pause_secs: parse_env_var("FILEROOM_INTER_CLIENT_PAUSE_SECS")?
                .unwrap_or(defaults.inter_client_pause_secs),
        };

        Ok(Config {
            download_dir,
            client_list_path,
            document_log_path,
            export,
        })
    }

    /// Get download retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.export.retry_delay_secs)
    }

    /// Get single-file download timeout as Duration
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.export.download_timeout_secs)
    }

    /// Get bulk zip download timeout as Duration
    pub fn zip_download_timeout(&self) -> Duration {
        Duration::from_secs(self.export.zip_download_timeout_secs)
    }

    /// Get staging poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.export.poll_interval_ms)
    }

    /// Get inter-client pause as Duration
    pub fn inter_client_pause(&self) -> Duration {
        Duration::from_secs(self.export.inter_client_pause_secs)
    }

    /// Validate configuration and create the download directory
    pub fn validate(&self) -> Result<()> {
        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!(
                "Cannot create download directory: {}",
                self.download_dir.display()
            )
        })?;

        if self.export.items_per_page == 0 {
            return Err(anyhow::anyhow!("FILEROOM_ITEMS_PER_PAGE must be at least 1"));
        }

        if !self.client_list_path.exists() {
            return Err(anyhow::anyhow!(
                "Client list does not exist: {}",
                self.client_list_path.display()
            ));
        }

        Ok(())
    }
}

/// Helper function to parse environment variable as a specific type
fn parse_env_var<T>(var_name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display + Send + Sync + std::error::Error + 'static,
{
    match std::env::var(var_name) {
        Ok(val) => val.parse().map(Some).with_context(|| {
            format!("Failed to parse environment variable {} = '{}'", var_name, val)
        }),
        Err(_) => Ok(None),
    }
}
