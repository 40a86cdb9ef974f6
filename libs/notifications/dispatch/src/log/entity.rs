use std::str::FromStr;

use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

use crate::error::DispatchError;
use crate::models::{DeliveryStatus, EmailLogEntry, EmailPriority, TemplateVariables};

/// Sea-ORM entity for the `email_logs` table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "email_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub to_addresses: Json,
    pub cc_addresses: Json,
    pub subject: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub html: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub text: Option<String>,
    pub template_id: Option<String>,
    pub template_variables: Option<Json>,
    pub priority: String,
    /// 1 = critical .. 4 = low; drain order key
    pub priority_rank: i16,
    pub trigger_category: String,
    pub related_entity_id: Option<String>,
    pub user_id: Option<String>,
    pub status: String,
    pub retry_count: i32,
    pub provider_message_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub sent_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
    pub claimed_until: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn addresses(value: Json) -> Result<Vec<String>, DispatchError> {
    Ok(serde_json::from_value(value)?)
}

impl TryFrom<Model> for EmailLogEntry {
    type Error = DispatchError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let priority = EmailPriority::from_str(&model.priority)
            .map_err(|_| DispatchError::Storage(format!("unknown priority '{}'", model.priority)))?;
        let status = DeliveryStatus::from_str(&model.status)
            .map_err(|_| DispatchError::Storage(format!("unknown status '{}'", model.status)))?;
        let template_variables = model
            .template_variables
            .map(serde_json::from_value::<TemplateVariables>)
            .transpose()?;

        Ok(Self {
            id: model.id,
            to: addresses(model.to_addresses)?,
            cc: addresses(model.cc_addresses)?,
            subject: model.subject,
            html: model.html,
            text: model.text,
            template_id: model.template_id,
            template_variables,
            priority,
            trigger_category: model.trigger_category,
            related_entity_id: model.related_entity_id,
            user_id: model.user_id,
            status,
            retry_count: model.retry_count.max(0) as u32,
            provider_message_id: model.provider_message_id,
            last_error: model.last_error,
            created_at: model.created_at.into(),
            sent_at: model.sent_at.map(Into::into),
            updated_at: model.updated_at.into(),
            claimed_until: model.claimed_until.map(Into::into),
        })
    }
}

impl From<&EmailLogEntry> for ActiveModel {
    fn from(entry: &EmailLogEntry) -> Self {
        ActiveModel {
            id: Set(entry.id),
            to_addresses: Set(serde_json::json!(entry.to)),
            cc_addresses: Set(serde_json::json!(entry.cc)),
            subject: Set(entry.subject.clone()),
            html: Set(entry.html.clone()),
            text: Set(entry.text.clone()),
            template_id: Set(entry.template_id.clone()),
            template_variables: Set(entry
                .template_variables
                .clone()
                .map(serde_json::Value::Object)),
            priority: Set(entry.priority.to_string()),
            priority_rank: Set(entry.priority.rank()),
            trigger_category: Set(entry.trigger_category.clone()),
            related_entity_id: Set(entry.related_entity_id.clone()),
            user_id: Set(entry.user_id.clone()),
            status: Set(entry.status.to_string()),
            retry_count: Set(entry.retry_count as i32),
            provider_message_id: Set(entry.provider_message_id.clone()),
            last_error: Set(entry.last_error.clone()),
            created_at: Set(entry.created_at.into()),
            sent_at: Set(entry.sent_at.map(Into::into)),
            updated_at: Set(entry.updated_at.into()),
            claimed_until: Set(entry.claimed_until.map(Into::into)),
        }
    }
}

/// Only the columns a status transition may change.
pub(super) fn transition_model(entry: &EmailLogEntry) -> ActiveModel {
    ActiveModel {
        html: Set(entry.html.clone()),
        text: Set(entry.text.clone()),
        subject: Set(entry.subject.clone()),
        status: Set(entry.status.to_string()),
        retry_count: Set(entry.retry_count as i32),
        provider_message_id: Set(entry.provider_message_id.clone()),
        last_error: Set(entry.last_error.clone()),
        sent_at: Set(entry.sent_at.map(Into::into)),
        updated_at: Set(entry.updated_at.into()),
        claimed_until: Set(entry.claimed_until.map(Into::into)),
        ..Default::default()
    }
}
