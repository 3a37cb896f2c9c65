/// Entry point for the cap scraper.
///
/// Periodically pulls container metrics from cAdvisor, filters them, and writes the accepted
/// samples as JSON lines to stdout. Logging goes through `env_logger` (`RUST_LOG`).
///
/// # Errors
///
/// Returns an error if the configuration is invalid or incomplete (e.g., missing
/// `GCP_PROJECT`), in which case the process exits before any scraping starts.
///
/// # Examples
///
/// ```bash
/// GCP_PROJECT=p GCP_ZONE=us-central1-a GCP_INSTANCE_NAME=vm-1 RUST_LOG=info cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    cap_scraper::run().await
}
