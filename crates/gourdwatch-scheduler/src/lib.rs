//! # GourdWatch Scheduler
//!
//! Background harvest-window reminders and cycle completion.
//!
//! ## Architecture
//! ```text
//! PeriodicJob (tokio interval, single-flight)
//!   └── SchedulerEngine::tick(today)
//!         ├── HarvestSweep        due day → compose → dispatch → mark notified → save
//!         │     └── PushGateway   Expo push API (timeout-bounded, no retry)
//!         └── CompletionEvaluator window elapsed → Completed | Failed → save
//!
//! MonitoringStore: SqliteStore (JSON-embedded window) | MemoryStore
//! RecordLocks:     per-record serialization shared with the HTTP API
//! ```

pub mod dispatch;
pub mod engine;
pub mod evaluator;
pub mod locks;
pub mod notify;
pub mod persistence;
pub mod store;
pub mod sweep;

#[cfg(test)]
mod testing;

pub use dispatch::{ExpoPushGateway, LogPushGateway, is_expo_push_token};
pub use engine::{PeriodicJob, SchedulerEngine, TickReport, spawn_scheduler};
pub use evaluator::{CompletionEvaluator, EvaluationReport};
pub use locks::RecordLocks;
pub use notify::{HarvestReminder, ReminderEntry, ReminderHistory};
pub use persistence::SqliteStore;
pub use store::MemoryStore;
pub use sweep::{HarvestSweep, SweepReport};
