//! Harvest reminder composition and the in-memory reminder history.

use chrono::{DateTime, NaiveDate, Utc};
use gourdwatch_core::harvest::HARVEST_WINDOW_DAYS;
use gourdwatch_core::traits::{DispatchOutcome, PushMessage};
use gourdwatch_core::{MonitoringRecord, PopulatedRecord};
use serde::{Deserialize, Serialize};

const HISTORY_LIMIT: usize = 100;

/// Headline for the given window day.
pub fn headline(day_index: usize) -> String {
    let last = HARVEST_WINDOW_DAYS - 1;
    match day_index {
        0 => "Harvest window opens today; 7-day window begins.".to_string(),
        i if i >= last => "Final day to harvest.".to_string(),
        i => {
            let remaining = last - i;
            let unit = if remaining == 1 { "day" } else { "days" };
            format!("{remaining} {unit} remaining in the harvest window.")
        }
    }
}

/// Title and body of a reminder, before it is addressed to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReminder {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl HarvestReminder {
    /// Compose the reminder for `day_index` of a populated record.
    pub fn compose(populated: &PopulatedRecord, day_index: usize) -> Self {
        let record: &MonitoringRecord = &populated.record;
        let gourd_name = populated
            .gourd_type
            .as_ref()
            .map(|g| g.name.as_str())
            .unwrap_or("Unknown gourd");
        let plot = record
            .plot_label
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("unspecified");
        let harvest_date = record
            .harvest_window
            .days()
            .get(day_index)
            .map(|d| d.date)
            .unwrap_or_else(|| record.harvest_window.last_date());

        let body = format!(
            "{}\nPollinated: {}\nGourd type: {}\nPlot: {}\nExpected harvest: {}\nActual harvest: {}",
            headline(day_index),
            human_date(record.pollination_date),
            gourd_name,
            plot,
            record.expected_harvest(),
            record.actual_harvest(),
        );

        Self {
            title: format!("Harvest reminder: {gourd_name}"),
            body,
            data: serde_json::json!({
                "type": "harvest_reminder",
                "monitoring_id": record.id,
                "day_index": day_index,
                "harvest_date": harvest_date.format("%Y-%m-%d").to_string(),
            }),
        }
    }

    pub fn to_message(&self, destination: &str) -> PushMessage {
        PushMessage {
            to: destination.to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.clone(),
        }
    }
}

/// "January 1, 2024"
pub fn human_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// One dispatch attempt, kept for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderEntry {
    pub monitoring_id: String,
    pub owner_id: String,
    pub day_index: usize,
    pub title: String,
    pub outcome: DispatchOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer of the most recent dispatch attempts.
#[derive(Debug, Default)]
pub struct ReminderHistory {
    entries: Vec<ReminderEntry>,
}

impl ReminderHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: ReminderEntry) {
        self.entries.push(entry);
        // Ring buffer, keep last HISTORY_LIMIT
        if self.entries.len() > HISTORY_LIMIT {
            self.entries.remove(0);
        }
    }

    pub fn entries(&self) -> &[ReminderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gourdwatch_core::{EvidenceImage, EvidenceKind, GourdType};

    fn populated(plot: Option<&str>) -> PopulatedRecord {
        let mut record =
            MonitoringRecord::new("u1", "g1", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
                .with_plot_label(plot.map(String::from));
        record.add_evidence(
            EvidenceKind::PollinatedFlower,
            vec![
                EvidenceImage { id: "p1".into(), url: "https://cdn/p1".into() },
                EvidenceImage { id: "p2".into(), url: "https://cdn/p2".into() },
            ],
        );
        PopulatedRecord {
            record,
            owner: None,
            gourd_type: Some(GourdType {
                id: "g1".into(),
                name: "Bottle gourd".into(),
            }),
        }
    }

    #[test]
    fn test_headlines() {
        assert!(headline(0).contains("opens today"));
        assert!(headline(6).contains("Final day"));
        assert_eq!(headline(3), "3 days remaining in the harvest window.");
        assert_eq!(headline(5), "1 day remaining in the harvest window.");
        assert_eq!(headline(1), "5 days remaining in the harvest window.");
    }

    #[test]
    fn test_compose_body() {
        let reminder = HarvestReminder::compose(&populated(Some("North bed")), 0);
        assert_eq!(reminder.title, "Harvest reminder: Bottle gourd");
        assert!(reminder.body.starts_with("Harvest window opens today"));
        assert!(reminder.body.contains("Pollinated: January 1, 2024"));
        assert!(reminder.body.contains("Plot: North bed"));
        assert!(reminder.body.contains("Expected harvest: 2"));
        assert!(reminder.body.contains("Actual harvest: 0"));
        assert_eq!(reminder.data["harvest_date"], "2024-01-08");
        assert_eq!(reminder.data["day_index"], 0);
    }

    #[test]
    fn test_missing_plot_and_type() {
        let mut p = populated(None);
        p.gourd_type = None;
        let reminder = HarvestReminder::compose(&p, 6);
        assert!(reminder.body.contains("Plot: unspecified"));
        assert!(reminder.body.starts_with("Final day to harvest."));
        assert_eq!(reminder.title, "Harvest reminder: Unknown gourd");
        assert_eq!(reminder.data["harvest_date"], "2024-01-14");
    }

    #[test]
    fn test_history_ring_buffer() {
        let mut history = ReminderHistory::new();
        for i in 0..105 {
            history.record(ReminderEntry {
                monitoring_id: format!("r{i}"),
                owner_id: "u1".into(),
                day_index: 0,
                title: "t".into(),
                outcome: DispatchOutcome::Failed("x".into()),
                timestamp: Utc::now(),
            });
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.entries()[0].monitoring_id, "r5");
    }
}
