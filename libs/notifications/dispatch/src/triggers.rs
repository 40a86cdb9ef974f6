//! Known business events that send email.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::models::EmailPriority;
use crate::rate_limit::TriggerPolicy;

/// Trigger categories with a catalog template of the same id.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    EmployeeRequestCreated,
    EmployeeRequestResponded,
    ProductOrderPending,
    ProductOrderApproved,
    ProductOrderRejected,
    ProductOrderCompleted,
    PayrollGenerated,
    PayrollReminder,
    BonusApproved,
    BonusReminder,
    BackupCompleted,
    BackupFailed,
    RevenueMismatch,
    LargeExpense,
}

impl Trigger {
    /// Rate-limit caps applied per user for this trigger.
    pub fn policy(self) -> TriggerPolicy {
        use Trigger::*;
        match self {
            EmployeeRequestCreated => TriggerPolicy::hourly(10),
            ProductOrderPending => TriggerPolicy::hourly(20),
            PayrollGenerated | PayrollReminder | BonusApproved | BonusReminder
            | BackupCompleted => TriggerPolicy::daily(1),
            BackupFailed => TriggerPolicy::daily(3),
            RevenueMismatch => TriggerPolicy::daily(5),
            LargeExpense => TriggerPolicy::daily(10),
            EmployeeRequestResponded | ProductOrderApproved | ProductOrderRejected
            | ProductOrderCompleted => TriggerPolicy::unlimited(),
        }
    }

    pub fn default_priority(self) -> EmailPriority {
        use Trigger::*;
        match self {
            BackupFailed => EmailPriority::Critical,
            EmployeeRequestCreated | EmployeeRequestResponded | PayrollGenerated
            | BackupCompleted | RevenueMismatch => EmailPriority::High,
            ProductOrderPending | ProductOrderApproved | PayrollReminder | BonusApproved
            | LargeExpense => EmailPriority::Medium,
            ProductOrderRejected | ProductOrderCompleted | BonusReminder => EmailPriority::Low,
        }
    }

    /// Catalog template id for this trigger.
    pub fn template_id(self) -> &'static str {
        self.into()
    }

    pub fn all() -> impl Iterator<Item = Trigger> {
        Trigger::iter()
    }
}
