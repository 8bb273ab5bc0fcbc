//! In-memory monitoring store.
//! Backs tests and `serve --in-memory`; state is lost on restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use gourdwatch_core::traits::MonitoringStore;
use gourdwatch_core::{GourdType, GourdWatchError, MonitoringRecord, MonitoringStatus, Result, UserProfile};

#[derive(Default)]
struct Tables {
    records: BTreeMap<String, MonitoringRecord>,
    users: HashMap<String, UserProfile>,
    gourd_types: BTreeMap<String, GourdType>,
}

/// Process-local store with the same query semantics as the SQLite store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    #[cfg(test)]
    fail_saves: std::sync::atomic::AtomicBool,
    #[cfg(test)]
    fail_due_queries: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| GourdWatchError::Store(format!("Lock: {e}")))
    }

    /// Make every subsequent `save` fail with a store error.
    #[cfg(test)]
    pub(crate) fn set_fail_saves(&self, fail: bool) {
        self.fail_saves
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make `find_due_for_notification` fail as if the store were unreachable.
    #[cfg(test)]
    pub(crate) fn set_fail_due_queries(&self, fail: bool) {
        self.fail_due_queries
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Filter records, dropping any whose window does not validate.
    fn select<F>(&self, keep: F) -> Result<Vec<MonitoringRecord>>
    where
        F: Fn(&MonitoringRecord) -> bool,
    {
        let tables = self.tables()?;
        Ok(tables
            .records
            .values()
            .filter(|r| match r.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("⚠️ Skipping record: {e}");
                    false
                }
            })
            .filter(|r| keep(r))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MonitoringStore for MemoryStore {
    async fn find_due_for_notification(&self, today: NaiveDate) -> Result<Vec<MonitoringRecord>> {
        #[cfg(test)]
        if self.fail_due_queries.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(GourdWatchError::Store("simulated query failure".into()));
        }
        self.select(|r| r.harvest_window.due_index(today).is_some())
    }

    async fn find_elapsed_active(&self, today: NaiveDate) -> Result<Vec<MonitoringRecord>> {
        self.select(|r| {
            r.status == MonitoringStatus::InProgress && r.harvest_window.is_elapsed(today)
        })
    }

    async fn save(&self, record: &MonitoringRecord) -> Result<()> {
        #[cfg(test)]
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(GourdWatchError::Store("simulated write failure".into()));
        }
        self.tables()?
            .records
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn insert(&self, record: &MonitoringRecord) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.records.contains_key(&record.id) {
            return Err(GourdWatchError::Conflict(format!(
                "record {} already exists",
                record.id
            )));
        }
        tables.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MonitoringRecord>> {
        Ok(self.tables()?.records.get(id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<MonitoringRecord>> {
        let mut records: Vec<_> = self
            .tables()?
            .records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.tables()?.records.remove(id).is_some())
    }

    async fn user(&self, id: &str) -> Result<Option<UserProfile>> {
        Ok(self.tables()?.users.get(id).cloned())
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.tables()?.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn set_push_token(
        &self,
        user_id: &str,
        push_token: &str,
        display_name: Option<&str>,
    ) -> Result<UserProfile> {
        let mut tables = self.tables()?;
        let user = tables
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile {
                id: user_id.to_string(),
                display_name: String::new(),
                push_token: None,
            });
        user.push_token = Some(push_token.to_string());
        if let Some(name) = display_name {
            user.display_name = name.to_string();
        }
        Ok(user.clone())
    }

    async fn gourd_type(&self, id: &str) -> Result<Option<GourdType>> {
        Ok(self.tables()?.gourd_types.get(id).cloned())
    }

    async fn upsert_gourd_type(&self, gourd_type: &GourdType) -> Result<()> {
        self.tables()?
            .gourd_types
            .insert(gourd_type.id.clone(), gourd_type.clone());
        Ok(())
    }

    async fn list_gourd_types(&self) -> Result<Vec<GourdType>> {
        Ok(self.tables()?.gourd_types.values().cloned().collect())
    }
}
