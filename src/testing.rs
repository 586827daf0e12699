//! Test doubles for the capability boundaries: a scripted rendering surface
//! and an in-memory database. No network, no Chrome.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::scrapers::browser::{RenderSurface, SurfaceProvider};
use crate::store::Database;

/// Rendering surface that replays a script instead of driving a browser.
///
/// `pages[i]` is the content served after the (i+1)-th navigation; `counts`
/// is the sequence of values successive `count()` calls observe.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSurface {
    pub pages: Vec<String>,
    pub counts: Vec<usize>,
    /// End-of-results marker becomes visible once this many scroll rounds
    /// have run.
    pub marker_after_rounds: Option<usize>,
    /// Every navigation fails, simulating an unreachable source.
    pub fail_goto: bool,

    // Observed behavior, for assertions
    pub visited: Vec<String>,
    pub scroll_rounds: usize,
    pub count_idx: usize,
}

#[async_trait]
impl RenderSurface for ScriptedSurface {
    async fn goto(&mut self, url: &str) -> Result<()> {
        if self.fail_goto {
            return Err(anyhow!("connection refused"));
        }
        self.visited.push(url.to_string());
        Ok(())
    }

    async fn settle(&mut self, _wait: Duration) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<()> {
        Ok(())
    }

    async fn count(&mut self, _selector: &str) -> Result<usize> {
        let value = self
            .counts
            .get(self.count_idx)
            .or(self.counts.last())
            .copied()
            .unwrap_or(0);
        self.count_idx += 1;
        Ok(value)
    }

    async fn scroll_last_into_view(&mut self, _selector: &str) -> Result<()> {
        self.scroll_rounds += 1;
        Ok(())
    }

    async fn marker_visible(&mut self, _xpath: &str) -> Result<bool> {
        Ok(self
            .marker_after_rounds
            .map(|after| self.scroll_rounds >= after)
            .unwrap_or(false))
    }

    async fn content(&mut self) -> Result<String> {
        let idx = self.visited.len().saturating_sub(1);
        Ok(self
            .pages
            .get(idx)
            .or(self.pages.last())
            .cloned()
            .unwrap_or_default())
    }
}

/// Provider handing out clones of one scripted surface, one per stage.
pub struct ScriptedProvider {
    template: ScriptedSurface,
}

impl ScriptedProvider {
    pub fn new(template: ScriptedSurface) -> Self {
        Self { template }
    }
}

#[async_trait]
impl SurfaceProvider for ScriptedProvider {
    async fn open(&self) -> Result<Box<dyn RenderSurface>> {
        Ok(Box::new(self.template.clone()))
    }
}

/// In-memory table store implementing the persistence capability.
#[derive(Default)]
pub struct MemoryDb {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    next_id: Mutex<u64>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn field_matches(record: &Value, column: &str, wanted: &str) -> bool {
    match record.get(column) {
        Some(Value::String(s)) => s == wanted,
        Some(other) => other.to_string() == wanted,
        None => false,
    }
}

#[async_trait]
impl Database for MemoryDb {
    async fn select(&self, table: &str, filters: &[(&str, String)]) -> Result<Vec<Value>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| filters.iter().all(|(col, val)| field_matches(row, col, val)))
            .collect())
    }

    async fn insert(&self, table: &str, mut record: Value) -> Result<()> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        if let Value::Object(map) = &mut record {
            map.entry("id").or_insert(json!(next_id.to_string()));
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, record: Value) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("no such table: {table}"))?;
        let row = rows
            .iter_mut()
            .find(|row| field_matches(row, "id", id))
            .ok_or_else(|| anyhow!("no row with id {id} in {table}"))?;

        // Whole-record replace, keeping the store-assigned id
        let mut replacement = record;
        if let Value::Object(map) = &mut replacement {
            map.insert("id".to_string(), json!(id));
        }
        *row = replacement;
        Ok(())
    }
}

/// Database where every operation fails, for error-isolation tests.
pub struct FailingDb;

#[async_trait]
impl Database for FailingDb {
    async fn select(&self, _table: &str, _filters: &[(&str, String)]) -> Result<Vec<Value>> {
        Err(anyhow!("store unavailable"))
    }

    async fn insert(&self, _table: &str, _record: Value) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }

    async fn update(&self, _table: &str, _id: &str, _record: Value) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }
}
