use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Source;

/// Counters and timing for one adapter invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub source: Source,
    pub scraped: u64,
    pub new: u64,
    pub updated: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SourceStats {
    pub fn start(source: Source) -> Self {
        Self {
            source,
            scraped: 0,
            new: 0,
            updated: 0,
            errors: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }

    /// Audit-log status for the run record.
    pub fn status(&self) -> &'static str {
        if self.errors == 0 {
            "completed"
        } else {
            "completed_with_errors"
        }
    }
}

/// Aggregate for a whole pipeline run. Owned by the orchestrator; source
/// stats are merged in one-way at stage completion.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub sources_completed: Vec<Source>,
    pub sources_failed: Vec<Source>,
    pub total_listings: u64,
    pub total_new: u64,
    pub total_updated: u64,
    pub errors: Vec<String>,
}

impl PipelineStats {
    pub fn start(session_id: String) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            finished_at: None,
            sources_completed: Vec::new(),
            sources_failed: Vec::new(),
            total_listings: 0,
            total_new: 0,
            total_updated: 0,
            errors: Vec::new(),
        }
    }

    /// Merge a completed stage's stats into the aggregate.
    pub fn absorb(&mut self, stage: &SourceStats) {
        self.sources_completed.push(stage.source);
        self.total_listings += stage.scraped;
        self.total_new += stage.new;
        self.total_updated += stage.updated;
        if stage.errors > 0 {
            self.errors
                .push(format!("{}: {} item-level errors", stage.source, stage.errors));
        }
    }

    /// Record a stage that raised at the orchestrator boundary.
    pub fn record_failure(&mut self, source: Source, error: &str) {
        self.sources_failed.push(source);
        self.errors.push(format!("{source}: {error}"));
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }

    /// Clean run: nothing recorded anywhere. Drives the process exit code.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.sources_failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_accumulates_counts_and_surfaces_item_errors() {
        let mut pipeline = PipelineStats::start("test".to_string());

        let mut clean = SourceStats::start(Source::Onmap);
        clean.scraped = 10;
        clean.new = 7;
        clean.updated = 3;
        clean.finish();
        pipeline.absorb(&clean);

        let mut dirty = SourceStats::start(Source::Yad2);
        dirty.scraped = 4;
        dirty.errors = 2;
        dirty.finish();
        pipeline.absorb(&dirty);

        assert_eq!(pipeline.total_listings, 14);
        assert_eq!(pipeline.total_new, 7);
        assert_eq!(pipeline.total_updated, 3);
        assert_eq!(pipeline.sources_completed, vec![Source::Onmap, Source::Yad2]);
        assert_eq!(pipeline.errors.len(), 1);
        assert!(!pipeline.is_clean());
    }

    #[test]
    fn failed_stage_marks_run_dirty() {
        let mut pipeline = PipelineStats::start("test".to_string());
        pipeline.record_failure(Source::Madlan, "browser session could not be established");

        assert_eq!(pipeline.sources_failed, vec![Source::Madlan]);
        assert!(pipeline.errors[0].starts_with("madlan:"));
        assert!(!pipeline.is_clean());
    }

    #[test]
    fn status_reflects_item_errors() {
        let mut stats = SourceStats::start(Source::Onmap);
        assert_eq!(stats.status(), "completed");
        stats.errors = 1;
        assert_eq!(stats.status(), "completed_with_errors");
    }
}
