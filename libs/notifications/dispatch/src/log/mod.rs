//! Delivery log: one durable record per send attempt.
//!
//! Entries are never deleted here. Writes made on behalf of the queue
//! processor are conditional on the status and retry count that were read,
//! so two drains racing on the same entry cannot both apply a transition.
//! An entry is claimed before the provider is called, so it cannot be sent
//! twice either.

mod entity;
mod memory;
mod postgres;

pub use memory::InMemoryDeliveryLog;
pub use postgres::PgDeliveryLog;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchResult;
use crate::models::{DeliveryStatus, EmailLogEntry};

/// Largest page a listing returns, whatever `limit` asks for.
pub const MAX_LIST_LIMIT: u64 = 500;

/// Query for the log listing, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub status: Option<DeliveryStatus>,
    pub trigger_category: Option<String>,
    pub user_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u64 {
    50
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            status: None,
            trigger_category: None,
            user_id: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl LogFilter {
    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger_category = Some(trigger.into());
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Requested page size capped at [`MAX_LIST_LIMIT`].
    pub fn effective_limit(&self) -> u64 {
        self.limit.min(MAX_LIST_LIMIT)
    }

    fn matches(&self, entry: &EmailLogEntry) -> bool {
        self.status.is_none_or(|s| entry.status == s)
            && self
                .trigger_category
                .as_deref()
                .is_none_or(|t| entry.trigger_category == t)
            && self
                .user_id
                .as_deref()
                .is_none_or(|u| entry.user_id.as_deref() == Some(u))
    }
}

/// Entry counts created since a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub since: Option<DateTime<Utc>>,
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_trigger: BTreeMap<String, u64>,
}

impl DeliveryStats {
    pub fn status_count(&self, status: DeliveryStatus) -> u64 {
        self.by_status.get(status.as_ref()).copied().unwrap_or(0)
    }
}

/// Durable store of [`EmailLogEntry`] records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Persist a new entry.
    async fn insert(&self, entry: &EmailLogEntry) -> DispatchResult<()>;

    async fn get(&self, id: Uuid) -> DispatchResult<Option<EmailLogEntry>>;

    /// Up to `limit` queued entries not claimed at `now`, by priority then creation time.
    async fn queued_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> DispatchResult<Vec<EmailLogEntry>>;

    /// Claim a queued entry for one drain until `until`. Fails if the entry
    /// left `queued`, its retry count moved, or another claim is still live.
    async fn claim(
        &self,
        id: Uuid,
        expected_retry_count: u32,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DispatchResult<bool>;

    /// Overwrite the mutable fields of `entry` if the stored row still has
    /// `expected_status` and `expected_retry_count`. Returns whether it did.
    async fn update_if(
        &self,
        entry: &EmailLogEntry,
        expected_status: DeliveryStatus,
        expected_retry_count: u32,
    ) -> DispatchResult<bool>;

    async fn count_by_status(&self, status: DeliveryStatus) -> DispatchResult<u64>;

    async fn list(&self, filter: &LogFilter) -> DispatchResult<Vec<EmailLogEntry>>;

    async fn stats(&self, since: DateTime<Utc>) -> DispatchResult<DeliveryStats>;

    /// Entries that moved to `failed` at or after `since`.
    async fn failures_since(&self, since: DateTime<Utc>) -> DispatchResult<u64>;
}
