//! Scriptable in-process provider for tests and local runs

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{EmailProvider, ProviderReceipt, ProviderRequest};
use crate::error::{DispatchError, DispatchResult};

/// Provider that records requests and replays scripted failures.
///
/// Queued failures are consumed in order; once the script is empty every send
/// succeeds unless the provider was built with [`MockProvider::failing`].
#[derive(Clone, Default)]
pub struct MockProvider {
    sent: Arc<Mutex<Vec<ProviderRequest>>>,
    script: Arc<Mutex<VecDeque<DispatchError>>>,
    always_fail: Option<(String, Option<u16>)>,
    delay: Option<Duration>,
    attempts: Arc<AtomicU64>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose every send fails with `message`.
    pub fn failing(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            always_fail: Some((message.into(), status)),
            ..Self::default()
        }
    }

    /// Sleep before answering each send.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next send with `error`.
    pub async fn fail_next(&self, error: DispatchError) {
        self.script.lock().await.push_back(error);
    }

    /// Requests that were accepted.
    pub async fn sent(&self) -> Vec<ProviderRequest> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Every call to `send`, accepted or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether any accepted request listed `address` as a recipient.
    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent
            .lock()
            .await
            .iter()
            .any(|r| r.to.iter().any(|to| to == address))
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    async fn send(&self, request: &ProviderRequest) -> DispatchResult<ProviderReceipt> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.script.lock().await.pop_front() {
            return Err(error);
        }
        if let Some((message, status)) = &self.always_fail {
            return Err(DispatchError::provider(message.clone(), *status));
        }

        self.sent.lock().await.push(request.clone());
        Ok(ProviderReceipt {
            message_id: format!("mock-{}", attempt),
        })
    }

    async fn health_check(&self) -> DispatchResult<()> {
        if self.always_fail.is_some() {
            return Err(DispatchError::provider("Mock health check failed", None));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
