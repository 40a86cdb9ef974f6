use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::triggers::Trigger;

/// Per-user caps for one trigger category. `None` means uncapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPolicy {
    pub hourly: Option<u64>,
    pub daily: Option<u64>,
}

impl TriggerPolicy {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn hourly(limit: u64) -> Self {
        Self {
            hourly: Some(limit),
            daily: None,
        }
    }

    pub fn daily(limit: u64) -> Self {
        Self {
            hourly: None,
            daily: Some(limit),
        }
    }

    pub fn and_daily(mut self, limit: u64) -> Self {
        self.daily = Some(limit);
        self
    }
}

/// Policy table keyed by trigger category.
#[derive(Debug, Clone, Default)]
pub struct TriggerPolicies {
    policies: HashMap<String, TriggerPolicy>,
}

impl TriggerPolicies {
    /// Empty table: every category is uncapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policies for every known [`Trigger`].
    pub fn catalog() -> Self {
        Trigger::all().fold(Self::new(), |table, trigger| {
            table.with_policy(trigger.template_id(), trigger.policy())
        })
    }

    pub fn with_policy(mut self, category: impl Into<String>, policy: TriggerPolicy) -> Self {
        self.policies.insert(category.into(), policy);
        self
    }

    /// Policy for `category`; unknown categories are uncapped.
    pub fn get(&self, category: &str) -> TriggerPolicy {
        self.policies.get(category).copied().unwrap_or_default()
    }
}
