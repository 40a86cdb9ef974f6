use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tracing::debug;
use uuid::Uuid;

use super::entity::{self, transition_model, Column, Entity};
use super::{DeliveryLog, DeliveryStats, LogFilter};
use crate::error::DispatchResult;
use crate::models::{DeliveryStatus, EmailLogEntry};

/// Delivery log in the `email_logs` Postgres table.
#[derive(Clone)]
pub struct PgDeliveryLog {
    db: DatabaseConnection,
}

impl PgDeliveryLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn counts_by(&self, column: Column, since: DateTime<FixedOffset>) -> DispatchResult<BTreeMap<String, u64>> {
        let rows = Entity::find()
            .select_only()
            .column(column)
            .column_as(Column::Id.count(), "count")
            .filter(Column::CreatedAt.gte(since))
            .group_by(column)
            .into_tuple::<(String, i64)>()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(key, count)| (key, count.max(0) as u64))
            .collect())
    }
}

/// No claim, or one that has run out.
fn unclaimed(now: DateTime<FixedOffset>) -> Condition {
    Condition::any()
        .add(Column::ClaimedUntil.is_null())
        .add(Column::ClaimedUntil.lte(now))
}

#[async_trait]
impl DeliveryLog for PgDeliveryLog {
    async fn insert(&self, entry: &EmailLogEntry) -> DispatchResult<()> {
        Entity::insert(entity::ActiveModel::from(entry))
            .exec_without_returning(&self.db)
            .await?;
        debug!(entry_id = %entry.id, status = %entry.status, "Inserted email log entry");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DispatchResult<Option<EmailLogEntry>> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(EmailLogEntry::try_from)
            .transpose()
    }

    async fn queued_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> DispatchResult<Vec<EmailLogEntry>> {
        Entity::find()
            .filter(Column::Status.eq(DeliveryStatus::Queued.to_string()))
            .filter(unclaimed(now.into()))
            .order_by_asc(Column::PriorityRank)
            .order_by_asc(Column::CreatedAt)
            .limit(limit as u64)
            .all(&self.db)
            .await?
            .into_iter()
            .map(EmailLogEntry::try_from)
            .collect()
    }

    async fn update_if(
        &self,
        entry: &EmailLogEntry,
        expected_status: DeliveryStatus,
        expected_retry_count: u32,
    ) -> DispatchResult<bool> {
        let result = Entity::update_many()
            .set(transition_model(entry))
            .filter(Column::Id.eq(entry.id))
            .filter(Column::Status.eq(expected_status.to_string()))
            .filter(Column::RetryCount.eq(expected_retry_count as i32))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn claim(
        &self,
        id: Uuid,
        expected_retry_count: u32,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DispatchResult<bool> {
        let result = Entity::update_many()
            .set(entity::ActiveModel {
                claimed_until: Set(Some(until.into())),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(DeliveryStatus::Queued.to_string()))
            .filter(Column::RetryCount.eq(expected_retry_count as i32))
            .filter(unclaimed(now.into()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn count_by_status(&self, status: DeliveryStatus) -> DispatchResult<u64> {
        Ok(Entity::find()
            .filter(Column::Status.eq(status.to_string()))
            .count(&self.db)
            .await?)
    }

    async fn list(&self, filter: &LogFilter) -> DispatchResult<Vec<EmailLogEntry>> {
        let mut query = Entity::find();

        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.to_string()));
        }
        if let Some(trigger) = &filter.trigger_category {
            query = query.filter(Column::TriggerCategory.eq(trigger.clone()));
        }
        if let Some(user_id) = &filter.user_id {
            query = query.filter(Column::UserId.eq(user_id.clone()));
        }

        query
            .order_by_desc(Column::CreatedAt)
            .limit(filter.effective_limit())
            .offset(filter.offset)
            .all(&self.db)
            .await?
            .into_iter()
            .map(EmailLogEntry::try_from)
            .collect()
    }

    async fn stats(&self, since: DateTime<Utc>) -> DispatchResult<DeliveryStats> {
        let since_tz: DateTime<FixedOffset> = since.into();
        let by_status = self.counts_by(Column::Status, since_tz).await?;
        let by_trigger = self.counts_by(Column::TriggerCategory, since_tz).await?;

        Ok(DeliveryStats {
            since: Some(since),
            total: by_status.values().sum(),
            by_status,
            by_trigger,
        })
    }

    async fn failures_since(&self, since: DateTime<Utc>) -> DispatchResult<u64> {
        let since: DateTime<FixedOffset> = since.into();
        Ok(Entity::find()
            .filter(Column::Status.eq(DeliveryStatus::Failed.to_string()))
            .filter(Column::UpdatedAt.gte(since))
            .count(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SendEmailRequest;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn entry() -> EmailLogEntry {
        let request = SendEmailRequest::new("a@example.com", "Hi", "<p>Hi</p>", "backup_failed")
            .for_user("u1");
        EmailLogEntry::from_request(&request, DeliveryStatus::Queued)
    }

    #[test]
    fn test_model_round_trip() {
        let entry = entry();
        let model = entity::Model {
            id: entry.id,
            to_addresses: serde_json::json!(entry.to),
            cc_addresses: serde_json::json!(entry.cc),
            subject: entry.subject.clone(),
            html: entry.html.clone(),
            text: None,
            template_id: None,
            template_variables: None,
            priority: "medium".to_string(),
            priority_rank: 3,
            trigger_category: entry.trigger_category.clone(),
            related_entity_id: None,
            user_id: Some("u1".to_string()),
            status: "queued".to_string(),
            retry_count: 0,
            provider_message_id: None,
            last_error: None,
            created_at: entry.created_at.into(),
            sent_at: None,
            updated_at: entry.updated_at.into(),
            claimed_until: None,
        };

        let restored = EmailLogEntry::try_from(model).unwrap();
        assert_eq!(restored, entry);
    }

    #[test]
    fn test_unknown_status_is_storage_error() {
        let entry = entry();
        let mut model = entity::Model {
            id: entry.id,
            to_addresses: serde_json::json!(["a@example.com"]),
            cc_addresses: serde_json::json!([]),
            subject: "Hi".to_string(),
            html: None,
            text: None,
            template_id: None,
            template_variables: None,
            priority: "medium".to_string(),
            priority_rank: 3,
            trigger_category: "backup_failed".to_string(),
            related_entity_id: None,
            user_id: None,
            status: "queued".to_string(),
            retry_count: 0,
            provider_message_id: None,
            last_error: None,
            created_at: entry.created_at.into(),
            sent_at: None,
            updated_at: entry.updated_at.into(),
            claimed_until: None,
        };
        model.status = "bounced".to_string();
        assert!(EmailLogEntry::try_from(model).is_err());
    }

    #[tokio::test]
    async fn test_update_if_reports_lost_race() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let log = PgDeliveryLog::new(db);
        let entry = entry();

        assert!(log.update_if(&entry, DeliveryStatus::Queued, 0).await.unwrap());
        assert!(!log.update_if(&entry, DeliveryStatus::Queued, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_reports_taken_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let log = PgDeliveryLog::new(db);
        let now = Utc::now();
        let until = now + chrono::Duration::seconds(45);
        let id = entry().id;

        assert!(log.claim(id, 0, until, now).await.unwrap());
        assert!(!log.claim(id, 0, until, now).await.unwrap());
    }
}
