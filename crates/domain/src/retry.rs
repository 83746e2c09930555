//! Bounded retry for steps that can lose a race.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::OrderError;

/// A step that may be attempted more than once.
///
/// Implementors carry whatever state must survive between attempts.
#[async_trait]
pub trait Attempt: Send {
    type Output: Send;

    /// Runs attempt number `number`, starting at 1.
    async fn attempt(&mut self, number: u32) -> Result<Self::Output, OrderError>;
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: OrderError },

    #[error(transparent)]
    Fatal(OrderError),
}

impl From<RetryError> for OrderError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::Exhausted { .. } => OrderError::Conflict(e.to_string()),
            RetryError::Fatal(inner) => inner,
        }
    }
}

/// Retries retryable failures up to a fixed number of attempts.
///
/// Only [`OrderError::is_retryable`] errors are retried; anything else is
/// returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run<A: Attempt>(&self, step: &mut A) -> Result<A::Output, RetryError> {
        let mut number = 1;
        loop {
            match step.attempt(number).await {
                Ok(output) => return Ok(output),
                Err(e) if !e.is_retryable() => return Err(RetryError::Fatal(e)),
                Err(e) if number >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: number,
                        last: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt = number, error = %e, "retryable failure, retrying");
                    number += 1;
                }
            }
        }
    }
}
