//! Day-granularity clock.

use chrono::NaiveDate;
use std::sync::Mutex;

/// Source of "today". Time of day never matters to the scheduler.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall clock truncated to the date.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Settable clock for tests and one-off `tick --today` runs.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        if let Ok(mut guard) = self.today.lock() {
            *guard = today;
        }
    }

    pub fn advance_days(&self, days: u64) {
        if let Ok(mut guard) = self.today.lock() {
            *guard = guard
                .checked_add_days(chrono::Days::new(days))
                .unwrap_or(NaiveDate::MAX);
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        match self.today.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
