//! Harvest window calculator.
//!
//! A gourd flower pollinated on day `P` is harvestable from `P + 7` through
//! `P + 13`. The window is stored on the record as seven `HarvestDay` slots,
//! each carrying its own "reminder sent" flag.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::HarvestDay;

/// Days between pollination and the first harvest day.
pub const HARVEST_OFFSET_DAYS: u64 = 7;
/// Number of days in a harvest window.
pub const HARVEST_WINDOW_DAYS: usize = 7;

/// Fixed-length harvest window. Index 0 is the opening day, index 6 the final day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HarvestWindow([HarvestDay; HARVEST_WINDOW_DAYS]);

/// Build the harvest window for a pollination date. All days start un-notified.
pub fn compute_harvest_window(pollination_date: NaiveDate) -> HarvestWindow {
    HarvestWindow(std::array::from_fn(|i| HarvestDay {
        date: add_days(pollination_date, HARVEST_OFFSET_DAYS + i as u64),
        notified: false,
    }))
}

/// Whether every day of the window for `pollination_date` is a representable
/// date. Saturated windows repeat `NaiveDate::MAX` and fail `validate`.
pub fn window_fits(pollination_date: NaiveDate) -> bool {
    let last_offset = HARVEST_OFFSET_DAYS + HARVEST_WINDOW_DAYS as u64 - 1;
    pollination_date
        .checked_add_days(Days::new(last_offset))
        .is_some()
}

fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX)
}

impl HarvestWindow {
    pub fn days(&self) -> &[HarvestDay; HARVEST_WINDOW_DAYS] {
        &self.0
    }

    pub fn first_date(&self) -> NaiveDate {
        self.0[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.0[HARVEST_WINDOW_DAYS - 1].date
    }

    /// Lowest index whose date is `today` and whose reminder has not gone out.
    pub fn due_index(&self, today: NaiveDate) -> Option<usize> {
        self.0
            .iter()
            .position(|day| day.date == today && !day.notified)
    }

    /// Set the notified flag for one day. Returns false if the index is out of
    /// range or the day was already notified.
    pub fn mark_notified(&mut self, index: usize) -> bool {
        match self.0.get_mut(index) {
            Some(day) if !day.notified => {
                day.notified = true;
                true
            }
            _ => false,
        }
    }

    /// True once the final harvest day is strictly before `today`.
    pub fn is_elapsed(&self, today: NaiveDate) -> bool {
        self.last_date() < today
    }

    pub fn notified_count(&self) -> usize {
        self.0.iter().filter(|d| d.notified).count()
    }

    /// Check the window against the pollination date it was derived from:
    /// day 0 must be `pollination + 7` and every later day exactly one day after
    /// its predecessor.
    pub fn validate(&self, pollination_date: NaiveDate) -> Result<(), String> {
        let expected_start = add_days(pollination_date, HARVEST_OFFSET_DAYS);
        if self.first_date() != expected_start {
            return Err(format!(
                "window starts {} but pollination {} implies {}",
                self.first_date(),
                pollination_date,
                expected_start
            ));
        }
        for pair in self.0.windows(2) {
            if pair[0].date.succ_opt() != Some(pair[1].date) {
                return Err(format!(
                    "dates not contiguous: {} followed by {}",
                    pair[0].date, pair[1].date
                ));
            }
        }
        Ok(())
    }
}
