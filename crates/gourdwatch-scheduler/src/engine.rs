//! Scheduler engine: runs the harvest sweep and the completion evaluator on
//! every tick, and the periodic driver that fires those ticks.
//! Uses tokio::interval (sleeps between ticks, zero overhead when idle).

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::FutureExt;
use gourdwatch_core::GourdWatchError;
use gourdwatch_core::config::{GourdWatchConfig, SchedulerConfig};
use gourdwatch_core::traits::{Clock, MonitoringStore, PushGateway};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::evaluator::{CompletionEvaluator, EvaluationReport};
use crate::locks::RecordLocks;
use crate::notify::{ReminderEntry, ReminderHistory};
use crate::sweep::{HarvestSweep, SweepReport};

/// Result of one tick. A phase is `None` if its query failed; the error is in `errors`.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub today: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sweep: Option<SweepReport>,
    pub evaluation: Option<EvaluationReport>,
    pub errors: Vec<String>,
}

/// The scheduler engine. Owns both state machines and the reminder history.
pub struct SchedulerEngine {
    sweep: HarvestSweep,
    evaluator: CompletionEvaluator,
    history: Mutex<ReminderHistory>,
    last_tick: Mutex<Option<TickReport>>,
    ticking: AtomicBool,
}

/// Clears the engine's in-flight flag when a tick ends, even by panic.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<dyn MonitoringStore>,
        gateway: Arc<dyn PushGateway>,
        locks: RecordLocks,
        config: &GourdWatchConfig,
    ) -> Self {
        let dispatch_timeout = Duration::from_secs(config.push.timeout_secs);
        Self {
            sweep: HarvestSweep::new(store.clone(), gateway, locks.clone(), dispatch_timeout),
            evaluator: CompletionEvaluator::new(store, locks),
            history: Mutex::new(ReminderHistory::new()),
            last_tick: Mutex::new(None),
            ticking: AtomicBool::new(false),
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking.load(Ordering::SeqCst)
    }

    /// Run the sweep, then the evaluator, for `today`. Returns `None` without
    /// doing anything if another tick (periodic or manual) is in flight.
    /// A phase whose query errors is reported and retried on the next tick.
    pub async fn tick(&self, today: NaiveDate) -> Option<TickReport> {
        if self
            .ticking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Tick for {today} skipped, another tick is running");
            return None;
        }
        let _guard = TickGuard(&self.ticking);
        Some(self.run_phases(today).await)
    }

    async fn run_phases(&self, today: NaiveDate) -> TickReport {
        let started_at = Utc::now();
        let mut errors = Vec::new();

        let sweep = match self.sweep.run(today).await {
            Ok(report) => Some(report),
            Err(e) => {
                phase_failed("Harvest sweep", today, &e);
                errors.push(format!("sweep: {e}"));
                None
            }
        };

        let evaluation = match self.evaluator.run(today).await {
            Ok(report) => Some(report),
            Err(e) => {
                phase_failed("Completion evaluator", today, &e);
                errors.push(format!("evaluator: {e}"));
                None
            }
        };

        if let Some(report) = &sweep {
            if let Ok(mut history) = self.history.lock() {
                for entry in &report.attempts {
                    history.record(entry.clone());
                }
            }
        }

        let report = TickReport {
            today,
            started_at,
            finished_at: Utc::now(),
            sweep,
            evaluation,
            errors,
        };
        if let Ok(mut last) = self.last_tick.lock() {
            *last = Some(report.clone());
        }
        report
    }

    /// Most recent dispatch attempts, oldest first.
    pub fn history(&self) -> Vec<ReminderEntry> {
        self.history
            .lock()
            .map(|h| h.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn last_tick(&self) -> Option<TickReport> {
        self.last_tick.lock().ok().and_then(|t| t.clone())
    }
}

fn phase_failed(phase: &str, today: NaiveDate, e: &GourdWatchError) {
    if e.is_retryable() {
        tracing::warn!("⚠️ {phase} failed for {today}, retrying next tick: {e}");
    } else {
        tracing::error!("❌ {phase} failed for {today}: {e}");
    }
}

/// Type alias for the async closure a periodic job executes.
type JobFn = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A single-flight periodic job: a tick that arrives while the previous
/// invocation is still running is skipped, never queued.
pub struct PeriodicJob {
    name: String,
    period: Duration,
    run_on_start: bool,
    /// Guards against overlapping invocations.
    is_running: Arc<AtomicBool>,
    run: JobFn,
}

impl PeriodicJob {
    pub fn new<F, Fut>(name: &str, period: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            period,
            run_on_start: true,
            is_running: Arc::new(AtomicBool::new(false)),
            run: Box::new(move || Box::pin(f())),
        }
    }

    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Start one invocation in its own task, unless one is already running.
    pub fn fire(&self) -> Option<JoinHandle<()>> {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(job = %self.name, "Skipping, previous invocation still running");
            return None;
        }

        let fut = (self.run)();
        let is_running = self.is_running.clone();
        let name = self.name.clone();
        Some(tokio::spawn(async move {
            // Catch panics so the flag is always cleared
            let result = AssertUnwindSafe(fut).catch_unwind().await;
            is_running.store(false, Ordering::Release);
            if result.is_err() {
                tracing::error!("❌ Job '{}' panicked", name);
            }
        }))
    }

    /// Consume the job and tick it forever on a background task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "⏰ Job '{}' started (every {}s)",
                self.name,
                self.period.as_secs()
            );
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !self.run_on_start {
                // the first tick completes immediately
                interval.tick().await;
            }
            loop {
                interval.tick().await;
                self.fire();
            }
        })
    }
}

/// Spawn the harvest scheduler as a background tokio task.
pub fn spawn_scheduler(
    engine: Arc<SchedulerEngine>,
    clock: Arc<dyn Clock>,
    config: &SchedulerConfig,
) -> JoinHandle<()> {
    PeriodicJob::new(
        "harvest-scheduler",
        Duration::from_secs(config.interval_secs),
        move || {
            let engine = engine.clone();
            let clock = clock.clone();
            async move {
                if let Some(report) = engine.tick(clock.today()).await {
                    log_tick(&report);
                }
            }
        },
    )
    .run_on_start(config.run_on_start)
    .start()
}

fn log_tick(report: &TickReport) {
    let sweep = report.sweep.as_ref();
    let evaluation = report.evaluation.as_ref();
    tracing::info!(
        "📣 Tick {}: {} due, {} sent, {} no destination, {} rejected, {} failed | {} closed ({} completed, {} failed) | {} errors",
        report.today,
        sweep.map_or(0, |s| s.due),
        sweep.map_or(0, |s| s.delivered),
        sweep.map_or(0, |s| s.no_destination),
        sweep.map_or(0, |s| s.rejected),
        sweep.map_or(0, |s| s.failed),
        evaluation.map_or(0, |e| e.completed + e.failed),
        evaluation.map_or(0, |e| e.completed),
        evaluation.map_or(0, |e| e.failed),
        report.errors.len()
            + sweep.map_or(0, |s| s.errors)
            + evaluation.map_or(0, |e| e.errors),
    );
}
