//! Terminal front-end for browsing open applications.
//!
//! Wires config + logging, fetches the first page of open applications, and
//! prints it.  Mainly a smoke harness for the library; the real UI consumes
//! the same coordinator.

use pollo_client::{ApiClient, Config, ListCoordinator, ListKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    info!("Using API at {}", config.api_base_url);

    let client = ApiClient::new(&config)?;
    let mut listing = ListCoordinator::new(client, ListKind::Open, config.batch_size);

    if let Err(e) = listing.load_page(0).await {
        if let Some(message) = e.user_facing_message() {
            eprintln!("{message}");
        }
        return Err(e.into());
    }
    println!(
        "{} open applications ({} pages of {})",
        listing.total_count(),
        listing.page_count(),
        config.batch_size
    );
    for app in listing.applications() {
        println!(
            "#{:<6} {:<12} ${:<5} {}",
            app.application_id,
            app.status.as_str(),
            app.product_price,
            app.product_title
        );
    }

    Ok(())
}
