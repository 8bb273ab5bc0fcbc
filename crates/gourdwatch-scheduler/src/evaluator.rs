//! Completion status evaluator.
//!
//! Once the last harvest day is behind us, an in-progress cycle is closed:
//! `Completed` if any harvested-fruit photo was uploaded, `Failed` otherwise.
//! Terminal records never come back through `find_elapsed_active`.

use std::sync::Arc;

use chrono::NaiveDate;
use gourdwatch_core::traits::MonitoringStore;
use gourdwatch_core::{MonitoringStatus, Result};
use serde::Serialize;

use crate::locks::RecordLocks;

/// Tally of one evaluator pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EvaluationReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub errors: usize,
}

pub struct CompletionEvaluator {
    store: Arc<dyn MonitoringStore>,
    locks: RecordLocks,
}

impl CompletionEvaluator {
    pub fn new(store: Arc<dyn MonitoringStore>, locks: RecordLocks) -> Self {
        Self { store, locks }
    }

    pub async fn run(&self, today: NaiveDate) -> Result<EvaluationReport> {
        let elapsed = self.store.find_elapsed_active(today).await?;
        let mut report = EvaluationReport {
            examined: elapsed.len(),
            ..EvaluationReport::default()
        };

        for record in elapsed {
            match self.close(&record.id, today).await {
                Ok(Some(MonitoringStatus::Completed)) => report.completed += 1,
                Ok(Some(MonitoringStatus::Failed)) => report.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("⚠️ Evaluator skipped record {}: {e}", record.id);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Re-read under the record lock and apply the terminal status, if still due.
    async fn close(&self, id: &str, today: NaiveDate) -> Result<Option<MonitoringStatus>> {
        let _guard = self.locks.acquire(id).await;

        let Some(mut record) = self.store.get(id).await? else {
            return Ok(None);
        };
        let Some(outcome) = record.completion_outcome(today) else {
            return Ok(None);
        };
        if !record.finish(outcome) {
            return Ok(None);
        }
        self.store.save(&record).await?;

        tracing::info!(
            "🌱 Monitoring {} closed as {} ({} harvested)",
            id,
            outcome,
            record.actual_harvest()
        );
        Ok(Some(outcome))
    }
}
