//! cap-scraper: periodically scrapes container metrics from a local cAdvisor endpoint, drops
//! samples that must not be exported, and hands the rest to an exporter.
//!
//! Each cycle runs fetch → decode ([`exposition`]) → identify ([`registry`]) → filter
//! ([`filter`]) → export ([`scraper`]); [`pipeline`] wires the middle steps together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub mod config;
pub mod error;
pub mod exposition;
pub mod filter;
pub mod labels;
pub mod pipeline;
pub mod registry;
pub mod scraper;

/// Runs the scraper until SIGINT or SIGTERM.
///
/// Loads the configuration, starts the export worker, and drives the scrape scheduler. On
/// shutdown the current cycle is allowed to finish and the export queue is drained.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid or incomplete configuration (see [`config::Error`]).
/// - Failure to initialize the HTTP client.
/// - The export worker panicking.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::info!(
        "Scraping http://{}/metrics every {:?} (pattern `{}`)",
        config.cadvisor_host,
        config.scrape_interval,
        config.filter_pattern
    );

    let fetcher = scraper::HttpFetcher::new(&config.cadvisor_host)?;
    let (exporter, worker) =
        scraper::JsonExporter::new(config.resource(), scraper::DEFAULT_QUEUE_CAPACITY);
    let export_handle = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        worker.run(&mut stdout).await;
    });

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    let pipeline = pipeline::Pipeline::new(Arc::new(config.filter()));
    let mut scheduler =
        scraper::Scheduler::new(fetcher, exporter, pipeline, config.scrape_interval);
    scheduler.run(cancel).await;

    // Dropping the scheduler drops the last exporter handle, which lets the worker drain and exit.
    drop(scheduler);
    export_handle.await?;
    log::info!("Scraper stopped gracefully");

    Ok(())
}

async fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for SIGINT: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                log::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received shutdown signal: SIGINT"),
        _ = terminate => log::info!("Received shutdown signal: SIGTERM"),
    }
    cancel.cancel();
}
