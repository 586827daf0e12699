//! Persistence gateway: idempotent upsert keyed by `(source, external_id)`
//! plus run-log auditing.
//!
//! The remote store exposes no atomic upsert, only select/insert/update, so
//! the gateway does the natural-key lookup itself. Per-item failures are
//! counted and skipped, never propagated; audit-log failures are swallowed
//! outright.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::models::Listing;
use crate::stats::SourceStats;

pub const LISTINGS_TABLE: &str = "il_properties";
pub const RUN_LOG_TABLE: &str = "il_scraping_logs";

/// The remote data store's capability surface: equality-filtered select,
/// insert, and update-by-id.
#[async_trait]
pub trait Database: Send + Sync {
    async fn select(&self, table: &str, filters: &[(&str, String)]) -> Result<Vec<Value>>;
    async fn insert(&self, table: &str, record: Value) -> Result<()>;
    async fn update(&self, table: &str, id: &str, record: Value) -> Result<()>;
}

/// Supabase PostgREST client.
pub struct SupabaseDb {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseDb {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[async_trait]
impl Database for SupabaseDb {
    async fn select(&self, table: &str, filters: &[(&str, String)]) -> Result<Vec<Value>> {
        let mut request = self.client.get(self.endpoint(table));
        for (column, value) in filters {
            request = request.query(&[(*column, format!("eq.{value}"))]);
        }
        let response = self
            .authorize(request.query(&[("select", "*")]))
            .send()
            .await
            .context("select request failed")?
            .error_for_status()
            .context("select rejected by store")?;
        response.json().await.context("select response was not JSON")
    }

    async fn insert(&self, table: &str, record: Value) -> Result<()> {
        self.authorize(self.client.post(self.endpoint(table)))
            .header("Prefer", "return=minimal")
            .json(&record)
            .send()
            .await
            .context("insert request failed")?
            .error_for_status()
            .context("insert rejected by store")?;
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, record: Value) -> Result<()> {
        self.authorize(
            self.client
                .patch(self.endpoint(table))
                .query(&[("id", format!("eq.{id}"))]),
        )
        .header("Prefer", "return=minimal")
        .json(&record)
        .send()
        .await
        .context("update request failed")?
        .error_for_status()
        .context("update rejected by store")?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertCounts {
    pub new: u64,
    pub updated: u64,
    pub errors: u64,
}

enum Upserted {
    Inserted,
    Replaced,
}

/// Gateway in front of the store capability.
pub struct Gateway {
    db: Arc<dyn Database>,
}

impl Gateway {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Insert-or-replace each listing by its natural key. One listing's
    /// failure never aborts the batch.
    pub async fn upsert(&self, listings: &[Listing]) -> UpsertCounts {
        let mut counts = UpsertCounts::default();
        if listings.is_empty() {
            warn!("No listings to save");
            return counts;
        }

        for listing in listings {
            match self.upsert_one(listing).await {
                Ok(Upserted::Inserted) => counts.new += 1,
                Ok(Upserted::Replaced) => counts.updated += 1,
                Err(e) => {
                    warn!("Error saving listing {}: {e:#}", listing.external_id);
                    counts.errors += 1;
                }
            }
        }

        info!(
            "Saved to store: {} new, {} updated, {} errors",
            counts.new, counts.updated, counts.errors
        );
        counts
    }

    async fn upsert_one(&self, listing: &Listing) -> Result<Upserted> {
        let filters = [
            ("source", listing.source.to_string()),
            ("external_id", listing.external_id.clone()),
        ];
        let existing = self.db.select(LISTINGS_TABLE, &filters).await?;
        let record = serde_json::to_value(listing)?;

        match existing.first().and_then(row_id) {
            Some(id) => {
                self.db.update(LISTINGS_TABLE, &id, record).await?;
                debug!("Updated listing {}", listing.external_id);
                Ok(Upserted::Replaced)
            }
            None => {
                self.db.insert(LISTINGS_TABLE, record).await?;
                debug!("Inserted new listing {}", listing.external_id);
                Ok(Upserted::Inserted)
            }
        }
    }

    /// Append one audit record for an adapter invocation. Must never fail an
    /// otherwise-successful scrape, so errors are logged and dropped.
    pub async fn log_run(&self, stats: &SourceStats, triggered_by: Option<&str>) {
        let record = json!({
            "source": stats.source,
            "properties_scraped": stats.scraped,
            "properties_new": stats.new,
            "properties_updated": stats.updated,
            "errors_count": stats.errors,
            "duration_seconds": stats.duration_seconds(),
            "start_time": stats.started_at.to_rfc3339(),
            "end_time": stats.finished_at.map(|t| t.to_rfc3339()),
            "status": stats.status(),
            "triggered_by": triggered_by.unwrap_or("manual"),
        });

        match self.db.insert(RUN_LOG_TABLE, record).await {
            Ok(()) => info!("Scrape session logged to store"),
            Err(e) => warn!("Error logging scrape session: {e:#}"),
        }
    }
}

fn row_id(row: &Value) -> Option<String> {
    match row.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
