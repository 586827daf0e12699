//! Pipeline orchestrator: a fixed, explicit stage sequence.
//!
//! `Initialize → Scrape(source…) → Finalize`. Initialize failures are fatal;
//! every scrape stage is isolated: a source that raises is recorded as
//! failed and the next stage still runs. The aggregate is only touched at
//! stage boundaries.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::scrapers::browser::SurfaceProvider;
use crate::scrapers::traits::SourceAdapter;
use crate::stats::{PipelineStats, SourceStats};
use crate::store::Gateway;

/// Typed result of one scrape stage.
pub enum StageOutcome {
    Completed(SourceStats),
    Failed { stats: SourceStats, error: String },
}

pub struct Pipeline {
    config: RunConfig,
    gateway: Gateway,
    surfaces: Box<dyn SurfaceProvider>,
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl Pipeline {
    pub fn new(
        config: RunConfig,
        gateway: Gateway,
        surfaces: Box<dyn SurfaceProvider>,
        adapters: Vec<Box<dyn SourceAdapter>>,
    ) -> Self {
        Self { config, gateway, surfaces, adapters }
    }

    /// Execute the full run. `Err` only for fatal failures (configuration);
    /// scraping errors land in the returned stats instead.
    pub async fn run(&self) -> Result<PipelineStats> {
        let session_id = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut stats = PipelineStats::start(session_id);

        self.initialize(&stats)?;

        for adapter in &self.adapters {
            match self.scrape_stage(adapter.as_ref()).await {
                StageOutcome::Completed(stage) => stats.absorb(&stage),
                StageOutcome::Failed { stats: stage, error } => {
                    error!("{} scraping failed: {error}", stage.source);
                    stats.record_failure(stage.source, &error);
                }
            }
        }

        self.finalize(&mut stats);
        Ok(stats)
    }

    /// Validate mandatory configuration before any scraping begins.
    fn initialize(&self, stats: &PipelineStats) -> Result<()> {
        info!("=== STAGE: Initialize (session {}) ===", stats.session_id);

        self.config.validate().context("Environment validation failed")?;

        info!("✓ Environment validated");
        info!(
            "✓ Targets set: {} cities, {} listing types",
            self.config.cities.len(),
            self.config.listing_types.len()
        );
        Ok(())
    }

    /// One source, fully isolated: session acquired here, released
    /// unconditionally when the stage ends, success or not.
    async fn scrape_stage(&self, adapter: &dyn SourceAdapter) -> StageOutcome {
        let source = adapter.source();
        info!("=== STAGE: Scrape {source} ===");
        let mut stage = SourceStats::start(source);

        let scraped = async {
            let mut surface = self.surfaces.open().await?;
            adapter
                .scrape(
                    surface.as_mut(),
                    &self.config.listing_types,
                    &self.config.cities,
                    None,
                )
                .await
            // surface dropped here, closing the session even on error
        }
        .await;

        let outcome = match scraped {
            Ok(outcome) => outcome,
            Err(e) => {
                stage.finish();
                return StageOutcome::Failed { stats: stage, error: format!("{e:#}") };
            }
        };

        stage.scraped = outcome.listings.len() as u64;
        stage.errors += outcome.soft_errors.len() as u64;
        for soft in &outcome.soft_errors {
            warn!("{source}: {soft}");
        }

        let counts = self.gateway.upsert(&outcome.listings).await;
        stage.new = counts.new;
        stage.updated = counts.updated;
        stage.errors += counts.errors;
        stage.finish();

        self.gateway
            .log_run(&stage, self.config.triggered_by.as_deref())
            .await;

        info!(
            "{source} complete: {} scraped, {} new, {} updated, {} errors",
            stage.scraped, stage.new, stage.updated, stage.errors
        );
        StageOutcome::Completed(stage)
    }

    /// Compute duration and emit the human-readable summary.
    fn finalize(&self, stats: &mut PipelineStats) {
        stats.finish();

        info!("============================================================");
        info!("SCRAPING SESSION COMPLETE");
        info!("============================================================");
        info!("Session ID: {}", stats.session_id);
        if let Some(duration) = stats.duration_seconds() {
            info!("Duration: {duration}s");
        }
        info!("Total listings: {}", stats.total_listings);
        info!(
            "Sources completed: {}",
            stats
                .sources_completed
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        if !stats.sources_failed.is_empty() {
            warn!(
                "Sources failed: {}",
                stats
                    .sources_failed
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        if !stats.errors.is_empty() {
            error!("Errors encountered: {}", stats.errors.len());
            for err in &stats.errors {
                error!("  - {err}");
            }
        }
        info!("============================================================");
    }
}
