use std::time::Duration;

use crate::error::OrderError;
use crate::order::code::validate_prefix;

pub const DEFAULT_CODE_PREFIX: &str = "MOA";
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 5;
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for order placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementConfig {
    /// Leading segment of every order code.
    pub code_prefix: String,

    /// Insert attempts before a code collision surfaces as a conflict.
    pub max_code_attempts: u32,

    /// Upper bound for the whole placement transaction.
    pub transaction_timeout: Duration,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            code_prefix: DEFAULT_CODE_PREFIX.to_string(),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }
}

impl PlacementConfig {
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_prefix(&self.code_prefix)?;
        if self.max_code_attempts == 0 {
            return Err(OrderError::Validation(
                "max_code_attempts must be at least 1".to_string(),
            ));
        }
        if self.transaction_timeout.is_zero() {
            return Err(OrderError::Validation(
                "transaction_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PlacementConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let config = PlacementConfig {
            code_prefix: "moa".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PlacementConfig {
            max_code_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
