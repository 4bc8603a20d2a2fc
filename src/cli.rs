use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fileroom")]
#[command(about = "Bulk document exporter for GoFileRoom-style document management portals")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every pending client on the client list
    Run {
        /// Client list CSV (overrides FILEROOM_CLIENT_LIST)
        #[arg(short, long)]
        client_list: Option<PathBuf>,

        /// Base download directory (overrides FILEROOM_DOWNLOAD_DIR)
        #[arg(short, long)]
        download_dir: Option<PathBuf>,

        /// Re-export documents whose target file already exists
        #[arg(long)]
        redownload: bool,
    },

    /// Create the download directory and empty ledger files
    Init {
        /// Overwrite existing ledger files
        #[arg(long)]
        force: bool,
    },

    /// Summarize client and document progress from the ledger
    Status,
}
