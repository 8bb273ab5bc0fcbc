//! Monitoring record store trait.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{GourdType, MonitoringRecord, PopulatedRecord, UserProfile};

/// Persistence for monitoring records and the entities they reference.
///
/// `save` replaces the whole record and is atomic per record. Query methods
/// skip (and log) rows that fail to decode or validate instead of failing the
/// batch.
#[async_trait]
pub trait MonitoringStore: Send + Sync {
    /// Records with a harvest day dated `today` whose reminder has not gone out.
    async fn find_due_for_notification(&self, today: NaiveDate) -> Result<Vec<MonitoringRecord>>;

    /// In-progress records whose final harvest day is strictly before `today`.
    async fn find_elapsed_active(&self, today: NaiveDate) -> Result<Vec<MonitoringRecord>>;

    /// Upsert the full record state.
    async fn save(&self, record: &MonitoringRecord) -> Result<()>;

    /// Insert a new record. Fails with `Conflict` if the id exists.
    async fn insert(&self, record: &MonitoringRecord) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<MonitoringRecord>>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<MonitoringRecord>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn user(&self, id: &str) -> Result<Option<UserProfile>>;

    async fn upsert_user(&self, user: &UserProfile) -> Result<()>;

    /// Set a user's push destination in one atomic write, creating the
    /// profile if needed. `display_name` is only changed when given.
    async fn set_push_token(
        &self,
        user_id: &str,
        push_token: &str,
        display_name: Option<&str>,
    ) -> Result<UserProfile>;

    async fn gourd_type(&self, id: &str) -> Result<Option<GourdType>>;

    async fn upsert_gourd_type(&self, gourd_type: &GourdType) -> Result<()>;

    async fn list_gourd_types(&self) -> Result<Vec<GourdType>>;

    /// Resolve the owner and gourd type references of a record.
    async fn populate(&self, record: MonitoringRecord) -> Result<PopulatedRecord> {
        let owner = self.user(&record.owner_id).await?;
        let gourd_type = self.gourd_type(&record.gourd_type_id).await?;
        Ok(PopulatedRecord {
            record,
            owner,
            gourd_type,
        })
    }
}
