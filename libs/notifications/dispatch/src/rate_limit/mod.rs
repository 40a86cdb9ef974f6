//! Time-windowed send counters.
//!
//! Three scopes are tracked, each per hour and per day:
//!
//! ```text
//! email:global:hour:2025-10-05-14
//! email:user:<user_id>:day:2025-10-05
//! email:trigger:<category>:<user_id>:hour:2025-10-05-14
//! ```
//!
//! Buckets are UTC calendar hours/days. `check` reads all applicable counters
//! in one round trip and never writes; `commit` increments them after a
//! successful send. The check-then-commit pair is not atomic across scopes, so
//! concurrent senders can overshoot a ceiling by a few sends.

mod policy;
mod redis;
mod store;

pub use policy::{TriggerPolicies, TriggerPolicy};
pub use redis::RedisCounterStore;
pub use store::{CounterStore, InMemoryCounterStore};

#[cfg(test)]
pub use store::MockCounterStore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::DispatchResult;
use crate::settings::RateLimitCeilings;

/// Counter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Hour,
    Day,
}

impl Window {
    pub fn seconds(self) -> u64 {
        match self {
            Window::Hour => 3600,
            Window::Day => 86_400,
        }
    }

    pub fn ttl(self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// Calendar bucket label containing `now`.
    pub fn bucket(self, now: DateTime<Utc>) -> String {
        match self {
            Window::Hour => now.format("%Y-%m-%d-%H").to_string(),
            Window::Day => now.format("%Y-%m-%d").to_string(),
        }
    }

    fn as_key(self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }

    fn adjective(self) -> &'static str {
        match self {
            Window::Hour => "hourly",
            Window::Day => "daily",
        }
    }
}

/// Counter scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateScope {
    Global,
    User,
    Trigger,
}

impl fmt::Display for RateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RateScope::Global => "Global",
            RateScope::User => "User",
            RateScope::Trigger => "Trigger",
        };
        f.write_str(label)
    }
}

/// Who is sending what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitContext {
    pub trigger_category: String,
    pub user_id: Option<String>,
}

impl RateLimitContext {
    pub fn new(trigger_category: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            trigger_category: trigger_category.into(),
            user_id,
        }
    }
}

/// Result of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied {
        scope: RateScope,
        window: Window,
        reason: String,
        retry_after_secs: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// One counter that applies to a send.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Counter {
    scope: RateScope,
    window: Window,
    key: String,
}

impl Counter {
    fn ceiling(&self, ceilings: &RateLimitCeilings, policy: &TriggerPolicy) -> Option<u64> {
        match (self.scope, self.window) {
            (RateScope::Global, Window::Hour) => Some(ceilings.global_hourly),
            (RateScope::Global, Window::Day) => Some(ceilings.global_daily),
            (RateScope::User, Window::Hour) => Some(ceilings.user_hourly),
            (RateScope::User, Window::Day) => Some(ceilings.user_daily),
            (RateScope::Trigger, Window::Hour) => policy.hourly,
            (RateScope::Trigger, Window::Day) => policy.daily,
        }
    }

    fn denial_reason(&self, limit: u64) -> String {
        match self.scope {
            RateScope::Trigger => format!(
                "Trigger {} rate limit exceeded ({}/{})",
                self.window.adjective(),
                limit,
                self.window.as_key()
            ),
            scope => format!("{} {} rate limit exceeded", scope, self.window.adjective()),
        }
    }
}

/// Checks and commits windowed send counters.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policies: TriggerPolicies,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            policies: TriggerPolicies::catalog(),
        }
    }

    pub fn with_policies(mut self, policies: TriggerPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn policies(&self) -> &TriggerPolicies {
        &self.policies
    }

    /// Whether a send for `ctx` is allowed right now.
    pub async fn check(
        &self,
        ctx: &RateLimitContext,
        ceilings: &RateLimitCeilings,
    ) -> DispatchResult<RateDecision> {
        self.check_at(ctx, ceilings, Utc::now()).await
    }

    /// Check against the buckets containing `now`.
    ///
    /// Counters are evaluated global-hourly, global-daily, user-hourly,
    /// user-daily, trigger-hourly, trigger-daily; the first counter at or above
    /// its ceiling decides the denial.
    pub async fn check_at(
        &self,
        ctx: &RateLimitContext,
        ceilings: &RateLimitCeilings,
        now: DateTime<Utc>,
    ) -> DispatchResult<RateDecision> {
        let policy = self.policies.get(&ctx.trigger_category);
        let capped: Vec<(Counter, u64)> = self
            .counters(ctx, now)
            .into_iter()
            .filter_map(|c| c.ceiling(ceilings, &policy).map(|limit| (c, limit)))
            .collect();
        let keys: Vec<String> = capped.iter().map(|(c, _)| c.key.clone()).collect();
        let values = self.store.get_many(&keys).await?;

        for ((counter, ceiling), value) in capped.iter().zip(values) {
            if value >= *ceiling {
                debug!(
                    key = %counter.key,
                    value,
                    ceiling,
                    "Rate limit reached"
                );
                return Ok(RateDecision::Denied {
                    scope: counter.scope,
                    window: counter.window,
                    reason: counter.denial_reason(*ceiling),
                    retry_after_secs: counter.window.seconds(),
                });
            }
        }

        Ok(RateDecision::Allowed)
    }

    /// Register a completed send.
    pub async fn commit(&self, ctx: &RateLimitContext) -> DispatchResult<()> {
        self.commit_at(ctx, Utc::now()).await
    }

    /// Increment every counter that applies to `ctx`, capped or not.
    pub async fn commit_at(&self, ctx: &RateLimitContext, now: DateTime<Utc>) -> DispatchResult<()> {
        for counter in self.counters(ctx, now) {
            self.store
                .incr_with_expiry(&counter.key, counter.window.ttl())
                .await?;
        }
        Ok(())
    }

    /// Global counter for the bucket containing `now`.
    pub async fn global_count(&self, window: Window, now: DateTime<Utc>) -> DispatchResult<u64> {
        let key = global_key(window, now);
        let values = self.store.get_many(&[key]).await?;
        Ok(values.first().copied().unwrap_or(0))
    }

    fn counters(&self, ctx: &RateLimitContext, now: DateTime<Utc>) -> Vec<Counter> {
        let mut counters: Vec<Counter> = [Window::Hour, Window::Day]
            .into_iter()
            .map(|window| Counter {
                scope: RateScope::Global,
                window,
                key: global_key(window, now),
            })
            .collect();

        let Some(user_id) = ctx.user_id.as_deref() else {
            return counters;
        };

        for window in [Window::Hour, Window::Day] {
            counters.push(Counter {
                scope: RateScope::User,
                window,
                key: format!("email:user:{}:{}:{}", user_id, window.as_key(), window.bucket(now)),
            });
        }
        for window in [Window::Hour, Window::Day] {
            counters.push(Counter {
                scope: RateScope::Trigger,
                window,
                key: format!(
                    "email:trigger:{}:{}:{}:{}",
                    ctx.trigger_category,
                    user_id,
                    window.as_key(),
                    window.bucket(now)
                ),
            });
        }

        counters
    }
}

fn global_key(window: Window, now: DateTime<Utc>) -> String {
    format!("email:global:{}:{}", window.as_key(), window.bucket(now))
}
