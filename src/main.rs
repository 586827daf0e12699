use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nadlan_scout::config::RunConfig;
use nadlan_scout::pipeline::Pipeline;
use nadlan_scout::scrapers::{ChromeProvider, MadlanAdapter, OnmapAdapter, SourceAdapter, Yad2Adapter};
use nadlan_scout::store::{Gateway, SupabaseDb};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🏠 Nadlan Scout - Multi-Source Listing Scraper");
    info!("==============================================");

    let config = RunConfig::from_env();

    let db = match SupabaseDb::new(&config.supabase_url, &config.supabase_key) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to set up store client: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let gateway = Gateway::new(Arc::new(db));
    let surfaces = Box::new(ChromeProvider::new(config.headless));

    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        Box::new(OnmapAdapter::new(&config)),
        Box::new(Yad2Adapter::new(&config)),
        Box::new(MadlanAdapter::new(&config)),
    ];

    let pipeline = Pipeline::new(config, gateway, surfaces, adapters);

    match pipeline.run().await {
        Ok(stats) if stats.is_clean() => {
            info!("Scraping completed successfully");
            ExitCode::SUCCESS
        }
        Ok(_) => {
            error!("Scraping completed with errors");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
