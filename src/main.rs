use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
mod config;
mod errors;
mod ledger;
mod listing;
mod mapping;
mod models;
mod notify;
mod orchestrator;
mod portal;
mod staging;

use cli::{Cli, Commands};
use config::Config;
use ledger::Ledger;
use models::ClientStatus;
use notify::LogNotifier;
use orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Set default log level to INFO if not specified
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "fileroom=info");
    }

    // Initialize logging to both console and file
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let file_appender = tracing_appender::rolling::never(".", "fileroom.log");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            client_list,
            download_dir,
            redownload,
        } => {
            let mut config = Config::from_env()?;
            if let Some(path) = client_list {
                config.client_list_path = path.clone();
            }
            if let Some(dir) = download_dir {
                config.download_dir = dir.clone();
            }
            if *redownload {
                config.export.redownload_if_exists = true;
            }
            config.validate()?;

            let ledger = Ledger::load(&config.client_list_path, &config.document_log_path)?;
            let pending = ledger.pending_clients();
            if pending.is_empty() {
                info!("No pending clients on the client list, nothing to do");
                return Ok(());
            }
            info!("{} pending clients on the client list", pending.len());

            let driver = portal::connect()?;
            let mut orchestrator = Orchestrator::new(driver, LogNotifier, ledger, config);
            let summary = orchestrator.run().await?;
            info!(
                "Run complete: {} processed, {} succeeded, {} with warnings, {} failed{}",
                summary.processed,
                summary.succeeded,
                summary.warned,
                summary.failed,
                if summary.halted { " (halted early)" } else { "" }
            );
        }

        Commands::Init { force } => {
            let config = Config::from_env()?;
            std::fs::create_dir_all(&config.download_dir)?;

            if config.client_list_path.exists() && !*force {
                anyhow::bail!(
                    "client list already exists: {} (use --force to overwrite)",
                    config.client_list_path.display()
                );
            }

            Ledger::new().save(&config.client_list_path, &config.document_log_path)?;
            info!(
                "Created {} and {}",
                config.client_list_path.display(),
                config.document_log_path.display()
            );
            info!("Download directory: {}", config.download_dir.display());
        }

        Commands::Status => {
            let config = Config::from_env()?;
            let ledger = Ledger::load(&config.client_list_path, &config.document_log_path)?;

            let count = |status: ClientStatus| {
                ledger
                    .clients()
                    .iter()
                    .filter(|c| c.status == status)
                    .count()
            };

            println!("Clients: {} total", ledger.clients().len());
            println!("  pending:     {}", count(ClientStatus::Pending));
            println!("  in progress: {}", count(ClientStatus::InProgress));
            println!("  success:     {}", count(ClientStatus::Success));
            println!("  warning:     {}", count(ClientStatus::Warning));
            println!("  error:       {}", count(ClientStatus::Error));

            let downloaded: usize = ledger.clients().iter().map(|c| c.files_downloaded).sum();
            let total: usize = ledger.clients().iter().map(|c| c.total_documents).sum();
            println!("Documents: {}/{} downloaded", downloaded, total);

            for row in ledger.clients() {
                if row.status == ClientStatus::Warning || row.status == ClientStatus::Error {
                    println!(
                        "  {} | {} - {}: {}",
                        row.client_name,
                        row.client_number,
                        row.status.as_str(),
                        row.description
                    );
                }
            }
        }
    }

    Ok(())
}
