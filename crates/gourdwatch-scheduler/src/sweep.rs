//! Harvest notification sweep.
//!
//! Each (record, harvest day) pair moves `Pending → Notified` exactly when the
//! day is due and the push gateway accepts the reminder. Anything short of a
//! delivery leaves the day pending, so the next tick tries again.
//!
//! ```text
//! find_due_for_notification(today)
//!   └── per record (under its lock, re-read fresh)
//!         ├── lowest due day index
//!         ├── owner push token? ── no ──▶ skip (retry next tick)
//!         ├── compose reminder
//!         ├── dispatch (bounded by timeout)
//!         └── delivered ──▶ mark day notified ──▶ save
//! ```
//!
//! If `save` fails after a delivery the flag is lost and the reminder will be
//! sent again next tick. That gap is logged at error level.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use gourdwatch_core::Result;
use gourdwatch_core::traits::{DispatchOutcome, MonitoringStore, PushGateway, PushMessage};
use serde::Serialize;

use crate::locks::RecordLocks;
use crate::notify::{HarvestReminder, ReminderEntry};

/// Tally of one sweep pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    /// Records returned by the due query.
    pub due: usize,
    pub delivered: usize,
    /// Owner has no registered push destination.
    pub no_destination: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Store errors on individual records, including saves after delivery.
    pub errors: usize,
    /// Every dispatch attempt made during the pass.
    #[serde(skip)]
    pub attempts: Vec<ReminderEntry>,
}

/// What happened to one record during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Delivered,
    /// Delivered, but the notified flag could not be persisted.
    DeliveredUnsaved,
    /// No longer due after the fresh read (deleted, or handled concurrently).
    NotDue,
    NoDestination,
    Rejected,
    Failed,
}

pub struct HarvestSweep {
    store: Arc<dyn MonitoringStore>,
    gateway: Arc<dyn PushGateway>,
    locks: RecordLocks,
    dispatch_timeout: Duration,
}

impl HarvestSweep {
    pub fn new(
        store: Arc<dyn MonitoringStore>,
        gateway: Arc<dyn PushGateway>,
        locks: RecordLocks,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            locks,
            dispatch_timeout,
        }
    }

    /// Run one pass for `today`. Fails only if the due query itself fails;
    /// per-record problems are counted and logged.
    pub async fn run(&self, today: NaiveDate) -> Result<SweepReport> {
        let due = self.store.find_due_for_notification(today).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        for record in due {
            match self.process(&record.id, today, &mut report.attempts).await {
                Ok(Step::Delivered) => report.delivered += 1,
                Ok(Step::DeliveredUnsaved) => {
                    report.delivered += 1;
                    report.errors += 1;
                }
                Ok(Step::NotDue) => {}
                Ok(Step::NoDestination) => report.no_destination += 1,
                Ok(Step::Rejected) => report.rejected += 1,
                Ok(Step::Failed) => report.failed += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Sweep skipped record {}: {e}", record.id);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    async fn process(
        &self,
        id: &str,
        today: NaiveDate,
        attempts: &mut Vec<ReminderEntry>,
    ) -> Result<Step> {
        let _guard = self.locks.acquire(id).await;

        let Some(record) = self.store.get(id).await? else {
            return Ok(Step::NotDue);
        };
        let Some(day_index) = record.harvest_window.due_index(today) else {
            return Ok(Step::NotDue);
        };

        let populated = self.store.populate(record).await?;
        let destination = populated
            .owner
            .as_ref()
            .and_then(|owner| owner.push_token.clone())
            .filter(|token| !token.trim().is_empty());
        let Some(destination) = destination else {
            tracing::debug!(
                "No push destination for owner {} of record {}",
                populated.record.owner_id,
                id
            );
            return Ok(Step::NoDestination);
        };

        let reminder = HarvestReminder::compose(&populated, day_index);
        let outcome = self.dispatch(&reminder.to_message(&destination)).await;
        attempts.push(ReminderEntry {
            monitoring_id: id.to_string(),
            owner_id: populated.record.owner_id.clone(),
            day_index,
            title: reminder.title.clone(),
            outcome: outcome.clone(),
            timestamp: Utc::now(),
        });

        match outcome {
            DispatchOutcome::Delivered { ticket } => {
                let mut record = populated.record;
                record.harvest_window.mark_notified(day_index);
                record.touch();
                match self.store.save(&record).await {
                    Ok(()) => {
                        tracing::info!(
                            "🔔 Harvest reminder sent: record {} day {} (ticket {})",
                            id,
                            day_index,
                            ticket
                        );
                        Ok(Step::Delivered)
                    }
                    Err(e) => {
                        tracing::error!(
                            "❌ Reminder for record {} day {} delivered but not saved, it may be sent again: {e}",
                            id,
                            day_index
                        );
                        Ok(Step::DeliveredUnsaved)
                    }
                }
            }
            DispatchOutcome::Rejected(reason) => {
                tracing::warn!("⚠️ Reminder rejected for record {}: {}", id, reason);
                Ok(Step::Rejected)
            }
            DispatchOutcome::Failed(reason) => {
                tracing::warn!("⚠️ Reminder failed for record {}: {}", id, reason);
                Ok(Step::Failed)
            }
        }
    }

    /// One gateway call, bounded by the dispatch timeout.
    async fn dispatch(&self, message: &PushMessage) -> DispatchOutcome {
        match tokio::time::timeout(self.dispatch_timeout, self.gateway.send(message)).await {
            Ok(outcome) => outcome,
            Err(_) => DispatchOutcome::Failed(format!(
                "{} dispatch timed out after {}ms",
                self.gateway.name(),
                self.dispatch_timeout.as_millis()
            )),
        }
    }
}
