//! End-to-end pipeline runs against scripted surfaces and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use nadlan_scout::config::RunConfig;
use nadlan_scout::models::{IdConfidence, Listing, ListingType, Source};
use nadlan_scout::pipeline::Pipeline;
use nadlan_scout::scrapers::browser::RenderSurface;
use nadlan_scout::scrapers::{ScrapeOutcome, SourceAdapter};
use nadlan_scout::store::{Gateway, LISTINGS_TABLE, RUN_LOG_TABLE};
use nadlan_scout::testing::{MemoryDb, ScriptedProvider, ScriptedSurface};

fn test_config() -> RunConfig {
    RunConfig {
        supabase_url: "https://example.supabase.co".to_string(),
        supabase_key: "key".to_string(),
        cities: vec!["תל אביב".to_string()],
        listing_types: vec![ListingType::Buy],
        delay: Duration::ZERO,
        settle: Duration::ZERO,
        max_pages: 2,
        max_scrolls: 2,
        headless: true,
        triggered_by: Some("ci-777".to_string()),
    }
}

/// Adapter that yields a fixed number of listings without touching the surface.
struct FixedAdapter {
    source: Source,
    count: usize,
}

#[async_trait]
impl SourceAdapter for FixedAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn scrape(
        &self,
        _surface: &mut dyn RenderSurface,
        listing_types: &[ListingType],
        _cities: &[String],
        _limit: Option<usize>,
    ) -> Result<ScrapeOutcome> {
        let listing_type = listing_types[0];
        let listings = (0..self.count)
            .map(|n| {
                Listing::new(
                    self.source,
                    listing_type,
                    format!("{}_{n}", self.source),
                    IdConfidence::Stable,
                )
            })
            .collect();
        Ok(ScrapeOutcome { listings, soft_errors: vec![] })
    }
}

/// Adapter that raises immediately, as if its session could not navigate.
struct BrokenAdapter {
    source: Source,
}

#[async_trait]
impl SourceAdapter for BrokenAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn scrape(
        &self,
        _surface: &mut dyn RenderSurface,
        _listing_types: &[ListingType],
        _cities: &[String],
        _limit: Option<usize>,
    ) -> Result<ScrapeOutcome> {
        Err(anyhow!("browser session could not be established"))
    }
}

fn pipeline_with(db: Arc<MemoryDb>, adapters: Vec<Box<dyn SourceAdapter>>) -> Pipeline {
    Pipeline::new(
        test_config(),
        Gateway::new(db),
        Box::new(ScriptedProvider::new(ScriptedSurface::default())),
        adapters,
    )
}

#[tokio::test]
async fn failed_source_does_not_stop_later_sources() {
    let db = Arc::new(MemoryDb::new());
    let pipeline = pipeline_with(
        db.clone(),
        vec![
            Box::new(BrokenAdapter { source: Source::Yad2 }),
            Box::new(FixedAdapter { source: Source::Madlan, count: 3 }),
        ],
    );

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.sources_failed, vec![Source::Yad2]);
    assert_eq!(stats.sources_completed, vec![Source::Madlan]);
    assert_eq!(stats.total_listings, 3);
    assert_eq!(stats.total_new, 3);
    assert!(stats.errors[0].starts_with("yad2:"));

    // The error makes the run dirty even though listings were persisted
    assert!(!stats.is_clean());
    assert_eq!(db.rows(LISTINGS_TABLE).len(), 3);
}

#[tokio::test]
async fn clean_run_upserts_and_audits_every_stage() {
    let db = Arc::new(MemoryDb::new());
    let pipeline = pipeline_with(
        db.clone(),
        vec![
            Box::new(FixedAdapter { source: Source::Onmap, count: 2 }),
            Box::new(FixedAdapter { source: Source::Madlan, count: 1 }),
        ],
    );

    let stats = pipeline.run().await.unwrap();

    assert!(stats.is_clean());
    assert_eq!(stats.total_listings, 3);
    assert_eq!(stats.sources_completed, vec![Source::Onmap, Source::Madlan]);
    assert_eq!(db.rows(LISTINGS_TABLE).len(), 3);

    let audits = db.rows(RUN_LOG_TABLE);
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0]["status"], "completed");
    assert_eq!(audits[0]["triggered_by"], "ci-777");
}

#[tokio::test]
async fn rerun_updates_rather_than_duplicates() {
    let db = Arc::new(MemoryDb::new());

    let first = pipeline_with(
        db.clone(),
        vec![Box::new(FixedAdapter { source: Source::Onmap, count: 2 })],
    );
    let stats = first.run().await.unwrap();
    assert_eq!(stats.total_new, 2);
    assert_eq!(stats.total_updated, 0);

    let second = pipeline_with(
        db.clone(),
        vec![Box::new(FixedAdapter { source: Source::Onmap, count: 2 })],
    );
    let stats = second.run().await.unwrap();
    assert_eq!(stats.total_new, 0);
    assert_eq!(stats.total_updated, 2);

    assert_eq!(db.rows(LISTINGS_TABLE).len(), 2);
}

#[tokio::test]
async fn missing_mandatory_configuration_is_fatal() {
    let mut config = test_config();
    config.supabase_key.clear();

    let db = Arc::new(MemoryDb::new());
    let pipeline = Pipeline::new(
        config,
        Gateway::new(db.clone()),
        Box::new(ScriptedProvider::new(ScriptedSurface::default())),
        vec![Box::new(FixedAdapter { source: Source::Onmap, count: 2 })],
    );

    let err = pipeline.run().await.unwrap_err().to_string();
    assert!(err.contains("Environment validation failed"));
    // Nothing was scraped or persisted
    assert!(db.rows(LISTINGS_TABLE).is_empty());
}
