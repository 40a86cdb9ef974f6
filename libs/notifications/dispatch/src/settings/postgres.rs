use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::Set;
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::debug;

use super::entity::{self, Column, Entity};
use super::{EmailSettings, SettingsStore};
use crate::error::DispatchResult;

/// Settings read from the `email_settings` table on every load.
#[derive(Clone)]
pub struct PgSettingsStore {
    db: DatabaseConnection,
}

impl PgSettingsStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or overwrite one setting.
    pub async fn put(&self, key: &str, value: &str) -> DispatchResult<()> {
        let model = entity::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(chrono::Utc::now().into()),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Key)
                    .update_columns([Column::Value, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(key, "Email setting updated");
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn load(&self) -> DispatchResult<EmailSettings> {
        let pairs: HashMap<String, String> = Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| (row.key, row.value))
            .collect();

        EmailSettings::from_pairs(&pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn row(key: &str, value: &str) -> entity::Model {
        entity::Model {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: chrono::Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_load_applies_rows_over_defaults() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                row("global_enable", "true"),
                row("rate_limit_user_hourly", "3"),
            ]])
            .into_connection();

        let settings = PgSettingsStore::new(db).load().await.unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.limits.user_hourly, 3);
        assert_eq!(settings.limits.global_hourly, 100);
    }

    #[tokio::test]
    async fn test_empty_table_is_disabled() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<entity::Model>::new()])
            .into_connection();

        let settings = PgSettingsStore::new(db).load().await.unwrap();
        assert!(!settings.enabled);
    }
}
