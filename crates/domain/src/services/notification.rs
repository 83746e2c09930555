//! Order notification trait and implementations.
//!
//! Notifications are sent after the placement transaction commits, on a
//! detached task. A failed send is logged and dropped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId};
use order_store::Order;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Clone, Error)]
#[error("notification failed: {0}")]
pub struct NotificationError(pub String);

/// What a customer is told about a freshly placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub code: String,
    pub total: Money,
    pub line_count: usize,
    pub created_at: DateTime<Utc>,
}

impl OrderSummary {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            code: order.code.clone(),
            total: order.total,
            line_count: order.lines.len(),
            created_at: order.created_at,
        }
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, summary: &OrderSummary, recipient: CustomerId)
    -> Result<(), NotificationError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send(
        &self,
        summary: &OrderSummary,
        recipient: CustomerId,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            order_code = %summary.code,
            customer_id = %recipient,
            total = %summary.total,
            "order confirmation sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<(OrderSummary, CustomerId)>,
    attempts: usize,
    fail: bool,
}

/// Records notifications in memory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSender {
    state: Arc<Mutex<InMemoryNotificationState>>,
    attempted: Arc<Notify>,
}

impl InMemoryNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail.
    pub fn set_fail(&self, fail: bool) {
        self.lock().fail = fail;
    }

    /// Successfully delivered notifications, in delivery order.
    pub fn sent(&self) -> Vec<(OrderSummary, CustomerId)> {
        self.lock().sent.clone()
    }

    /// Number of send calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Waits until at least `count` sends were attempted.
    ///
    /// Returns false if that did not happen within `timeout`.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let attempted = self.attempted.notified();
                if self.attempts() >= count {
                    return;
                }
                attempted.await;
            }
        })
        .await
        .is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryNotificationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn send(
        &self,
        summary: &OrderSummary,
        recipient: CustomerId,
    ) -> Result<(), NotificationError> {
        let result = {
            let mut state = self.lock();
            state.attempts += 1;
            if state.fail {
                Err(NotificationError("mail relay unavailable".to_string()))
            } else {
                state.sent.push((summary.clone(), recipient));
                Ok(())
            }
        };
        self.attempted.notify_waiters();
        result
    }
}
