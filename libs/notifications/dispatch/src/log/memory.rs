use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DeliveryLog, DeliveryStats, LogFilter};
use crate::error::{DispatchError, DispatchResult};
use crate::models::{DeliveryStatus, EmailLogEntry};

/// Process-local delivery log for tests and single-instance runs.
#[derive(Debug, Default)]
pub struct InMemoryDeliveryLog {
    entries: RwLock<HashMap<Uuid, EmailLogEntry>>,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry, oldest first.
    pub async fn all(&self) -> Vec<EmailLogEntry> {
        let mut entries: Vec<EmailLogEntry> = self.entries.read().await.values().cloned().collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        entries
    }
}

#[async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn insert(&self, entry: &EmailLogEntry) -> DispatchResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.id) {
            return Err(DispatchError::Storage(format!("duplicate entry id {}", entry.id)));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DispatchResult<Option<EmailLogEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn queued_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> DispatchResult<Vec<EmailLogEntry>> {
        let mut queued: Vec<EmailLogEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.is_claimable(now))
            .cloned()
            .collect();
        queued.sort_by_key(|e| (e.priority, e.created_at, e.id));
        queued.truncate(limit);
        Ok(queued)
    }

    async fn update_if(
        &self,
        entry: &EmailLogEntry,
        expected_status: DeliveryStatus,
        expected_retry_count: u32,
    ) -> DispatchResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&entry.id) {
            Some(stored)
                if stored.status == expected_status && stored.retry_count == expected_retry_count =>
            {
                *stored = entry.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim(
        &self,
        id: Uuid,
        expected_retry_count: u32,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DispatchResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(stored) if stored.is_claimable(now) && stored.retry_count == expected_retry_count => {
                stored.claimed_until = Some(until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_by_status(&self, status: DeliveryStatus) -> DispatchResult<u64> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.status == status)
            .count() as u64)
    }

    async fn list(&self, filter: &LogFilter) -> DispatchResult<Vec<EmailLogEntry>> {
        let mut matching: Vec<EmailLogEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn stats(&self, since: DateTime<Utc>) -> DispatchResult<DeliveryStats> {
        let entries = self.entries.read().await;
        let mut stats = DeliveryStats {
            since: Some(since),
            ..DeliveryStats::default()
        };
        for entry in entries.values().filter(|e| e.created_at >= since) {
            stats.total += 1;
            *stats.by_status.entry(entry.status.to_string()).or_default() += 1;
            *stats
                .by_trigger
                .entry(entry.trigger_category.clone())
                .or_default() += 1;
        }
        Ok(stats)
    }

    async fn failures_since(&self, since: DateTime<Utc>) -> DispatchResult<u64> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.status == DeliveryStatus::Failed && e.updated_at >= since)
            .count() as u64)
    }
}
