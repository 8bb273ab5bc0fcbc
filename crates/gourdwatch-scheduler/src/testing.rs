//! Test doubles shared by the scheduler's unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use gourdwatch_core::traits::{DispatchOutcome, MonitoringStore, PushGateway, PushMessage};
use gourdwatch_core::{GourdType, MonitoringRecord, UserProfile};

use crate::store::MemoryStore;

pub const TOKEN: &str = "ExponentPushToken[test-device]";

/// Gateway that records every message and replays scripted outcomes.
/// Once the script runs out every send is `Delivered`.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<PushMessage>>,
    script: Mutex<VecDeque<DispatchOutcome>>,
    delay: Option<Duration>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_outcome(&self, outcome: DispatchOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &PushMessage) -> DispatchOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(message.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| DispatchOutcome::Delivered {
                ticket: format!("ticket-{}", self.sent.lock().unwrap().len()),
            })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Memory store with one user "u1" (push token optional) and gourd type "g1".
pub async fn seeded_store(push_token: Option<&str>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_user(&UserProfile {
            id: "u1".into(),
            display_name: "Grower".into(),
            push_token: push_token.map(String::from),
        })
        .await
        .unwrap();
    store
        .upsert_gourd_type(&GourdType {
            id: "g1".into(),
            name: "Bottle gourd".into(),
        })
        .await
        .unwrap();
    store
}

/// Insert a fresh record for "u1" pollinated on `pollinated`.
pub async fn insert_record(store: &MemoryStore, pollinated: NaiveDate) -> MonitoringRecord {
    let record = MonitoringRecord::new("u1", "g1", pollinated);
    store.insert(&record).await.unwrap();
    record
}
