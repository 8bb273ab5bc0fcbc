//! Core data model for cultivation monitoring.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GourdWatchError, Result};
use crate::harvest::{HarvestWindow, compute_harvest_window, window_fits};

/// One day of the harvest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestDay {
    pub date: NaiveDate,
    /// Set once the reminder for this day has been delivered.
    pub notified: bool,
}

/// Lifecycle of a cultivation cycle. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringStatus {
    InProgress,
    Completed,
    Failed,
}

impl MonitoringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for MonitoringStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an uploaded photo (hosted by the media service).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceImage {
    pub id: String,
    pub url: String,
}

/// Which evidence list an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Taken at pollination time; counts as the expected harvest.
    PollinatedFlower,
    /// Taken during the harvest window; counts as the actual harvest.
    HarvestedFruit,
}

/// A single gourd cultivation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringRecord {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub plot_label: Option<String>,
    pub gourd_type_id: String,
    pub pollination_date: NaiveDate,
    pub harvest_window: HarvestWindow,
    #[serde(default)]
    pub pollinated_flower_evidence: Vec<EvidenceImage>,
    #[serde(default)]
    pub harvested_fruit_evidence: Vec<EvidenceImage>,
    pub status: MonitoringStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoringRecord {
    /// Start a new cycle. The harvest window is derived from the pollination date.
    pub fn new(owner_id: &str, gourd_type_id: &str, pollination_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            plot_label: None,
            gourd_type_id: gourd_type_id.to_string(),
            pollination_date,
            harvest_window: compute_harvest_window(pollination_date),
            pollinated_flower_evidence: Vec::new(),
            harvested_fruit_evidence: Vec::new(),
            status: MonitoringStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    /// Like `new`, but rejects pollination dates whose harvest window would
    /// run past the end of the calendar.
    pub fn try_new(owner_id: &str, gourd_type_id: &str, pollination_date: NaiveDate) -> Result<Self> {
        check_pollination_date(pollination_date)?;
        Ok(Self::new(owner_id, gourd_type_id, pollination_date))
    }

    pub fn with_plot_label(mut self, label: Option<String>) -> Self {
        self.plot_label = label.filter(|l| !l.trim().is_empty());
        self
    }

    /// Reject records whose stored window does not match their pollination date.
    pub fn validate(&self) -> Result<()> {
        self.harvest_window
            .validate(self.pollination_date)
            .map_err(|reason| GourdWatchError::malformed(&self.id, reason))
    }

    pub fn add_evidence(&mut self, kind: EvidenceKind, images: Vec<EvidenceImage>) {
        match kind {
            EvidenceKind::PollinatedFlower => self.pollinated_flower_evidence.extend(images),
            EvidenceKind::HarvestedFruit => self.harvested_fruit_evidence.extend(images),
        }
        self.touch();
    }

    /// Correct the pollination date. Builds a fresh window, so every reminder
    /// flag starts over. Terminal cycles cannot be corrected.
    pub fn correct_pollination_date(&mut self, pollination_date: NaiveDate) -> Result<()> {
        if self.status.is_terminal() {
            return Err(GourdWatchError::Conflict(format!(
                "record {} is already {}",
                self.id, self.status
            )));
        }
        check_pollination_date(pollination_date)?;
        self.pollination_date = pollination_date;
        self.harvest_window = compute_harvest_window(pollination_date);
        self.touch();
        Ok(())
    }

    /// Status the cycle should end in, if its window has fully elapsed.
    /// Returns `None` for cycles that are still open or already terminal.
    pub fn completion_outcome(&self, today: NaiveDate) -> Option<MonitoringStatus> {
        if self.status != MonitoringStatus::InProgress || !self.harvest_window.is_elapsed(today) {
            return None;
        }
        if self.harvested_fruit_evidence.is_empty() {
            Some(MonitoringStatus::Failed)
        } else {
            Some(MonitoringStatus::Completed)
        }
    }

    /// Move to a terminal status. Refuses to leave a terminal status.
    pub fn finish(&mut self, status: MonitoringStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.touch();
        true
    }

    pub fn expected_harvest(&self) -> usize {
        self.pollinated_flower_evidence.len()
    }

    pub fn actual_harvest(&self) -> usize {
        self.harvested_fruit_evidence.len()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Owner of monitoring records. `push_token` is the registered device, if any.
fn check_pollination_date(pollination_date: NaiveDate) -> Result<()> {
    if window_fits(pollination_date) {
        Ok(())
    } else {
        Err(GourdWatchError::InvalidInput(format!(
            "pollination date {pollination_date} is too late for a harvest window"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub push_token: Option<String>,
}

/// Entry of the gourd-type taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GourdType {
    pub id: String,
    pub name: String,
}

/// A record with its owner and gourd type resolved.
#[derive(Debug, Clone)]
pub struct PopulatedRecord {
    pub record: MonitoringRecord,
    pub owner: Option<UserProfile>,
    pub gourd_type: Option<GourdType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn image(id: &str) -> EvidenceImage {
        EvidenceImage {
            id: id.into(),
            url: format!("https://cdn.example.com/{id}.jpg"),
        }
    }

    #[test]
    fn test_new_record_defaults() {
        let record = MonitoringRecord::new("u1", "g1", date(2024, 1, 1));
        assert_eq!(record.status, MonitoringStatus::InProgress);
        assert_eq!(record.harvest_window.first_date(), date(2024, 1, 8));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_blank_plot_label_is_dropped() {
        let record =
            MonitoringRecord::new("u1", "g1", date(2024, 1, 1)).with_plot_label(Some("  ".into()));
        assert_eq!(record.plot_label, None);
    }

    #[test]
    fn test_completion_outcome() {
        let mut record = MonitoringRecord::new("u1", "g1", date(2024, 1, 1));
        assert_eq!(record.completion_outcome(date(2024, 1, 14)), None);
        assert_eq!(
            record.completion_outcome(date(2024, 1, 15)),
            Some(MonitoringStatus::Failed)
        );

        record.add_evidence(EvidenceKind::HarvestedFruit, vec![image("f1")]);
        assert_eq!(
            record.completion_outcome(date(2024, 1, 15)),
            Some(MonitoringStatus::Completed)
        );
    }

    #[test]
    fn test_status_never_reverts() {
        let mut record = MonitoringRecord::new("u1", "g1", date(2024, 1, 1));
        assert!(record.finish(MonitoringStatus::Failed));
        assert!(!record.finish(MonitoringStatus::Completed));
        assert!(!record.finish(MonitoringStatus::InProgress));
        record.add_evidence(EvidenceKind::HarvestedFruit, vec![image("late")]);
        assert_eq!(record.status, MonitoringStatus::Failed);
        assert_eq!(record.completion_outcome(date(2024, 2, 1)), None);
    }

    #[test]
    fn test_correction_rebuilds_window() {
        let mut record = MonitoringRecord::new("u1", "g1", date(2024, 1, 1));
        record.harvest_window.mark_notified(0);
        record.correct_pollination_date(date(2024, 1, 3)).unwrap();
        assert_eq!(record.harvest_window.first_date(), date(2024, 1, 10));
        assert_eq!(record.harvest_window.notified_count(), 0);

        record.finish(MonitoringStatus::Completed);
        assert!(matches!(
            record.correct_pollination_date(date(2024, 1, 5)),
            Err(GourdWatchError::Conflict(_))
        ));
    }

    #[test]
    fn test_out_of_range_pollination_date_rejected() {
        assert!(matches!(
            MonitoringRecord::try_new("u1", "g1", NaiveDate::MAX),
            Err(GourdWatchError::InvalidInput(_))
        ));
        let mut record = MonitoringRecord::try_new("u1", "g1", date(2024, 1, 1)).unwrap();
        assert!(matches!(
            record.correct_pollination_date(NaiveDate::MAX),
            Err(GourdWatchError::InvalidInput(_))
        ));
        assert_eq!(record.pollination_date, date(2024, 1, 1));
    }

    #[test]
    fn test_evidence_counts() {
        let mut record = MonitoringRecord::new("u1", "g1", date(2024, 1, 1));
        record.add_evidence(EvidenceKind::PollinatedFlower, vec![image("p1"), image("p2")]);
        record.add_evidence(EvidenceKind::HarvestedFruit, vec![image("f1")]);
        assert_eq!(record.expected_harvest(), 2);
        assert_eq!(record.actual_harvest(), 1);
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&MonitoringStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(MonitoringStatus::parse("failed"), Some(MonitoringStatus::Failed));
        assert_eq!(MonitoringStatus::parse("bogus"), None);
    }
}
