//! # Engine Error Types
//!
//! Error types for ledger services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Business Rule  │  │   Database      │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Core(..)       │  │  Database(..)   │  │  InvalidConfig          │ │
//! │  │  TopUpNotFound  │  │                 │  │  ConfigLoadFailed       │ │
//! │  │  SessionConflict│  │                 │  │  ConfigSaveFailed       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │    Lifecycle    │                                                    │
//! │  │                 │                                                    │
//! │  │  ChannelError   │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rule errors carry a message meant for the buyer or admin;
//! everything else is an operator problem and is logged instead.

use thiserror::Error;

use vendo_core::{CoreError, CouponRejection};
use vendo_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering every failure a service can report.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Business Rule Errors
    // =========================================================================
    /// A ledger rule rejected the request. Nothing was written.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Top-up request id does not exist.
    #[error("Top-up request not found: {0}")]
    TopUpNotFound(i64),

    /// The conversation moved on before this step was submitted.
    #[error("Session for account {account_id} is at step {actual}, expected {expected}")]
    SessionConflict {
        account_id: i64,
        expected: String,
        actual: String,
    },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Storage failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid shop configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CouponRejection> for EngineError {
    fn from(err: CouponRejection) -> Self {
        EngineError::Core(CoreError::Coupon(err))
    }
}

impl From<vendo_core::ValidationError> for EngineError {
    fn from(err: vendo_core::ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database(err.into())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// The ledger rule that failed, if this is a business error.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the message can be shown to the buyer or admin as is.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            EngineError::Core(_) | EngineError::TopUpNotFound(_) | EngineError::SessionConflict { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_pass_through_unchanged() {
        let err: EngineError = CoreError::OrderNotFound(9).into();
        assert_eq!(err.to_string(), "Order not found: 9");
        assert!(err.is_user_facing());
        assert_eq!(err.as_core(), Some(&CoreError::OrderNotFound(9)));
    }

    #[test]
    fn test_coupon_rejection_converts() {
        let err: EngineError = CouponRejection::Expired {
            code: "LEBARAN".into(),
        }
        .into();
        assert!(matches!(err, EngineError::Core(CoreError::Coupon(_))));
    }

    #[test]
    fn test_operator_errors_are_not_user_facing() {
        let err: EngineError = DbError::PoolExhausted.into();
        assert!(!err.is_user_facing());
        assert!(EngineError::InvalidConfig("expiry_minutes".into()).is_config_error());
    }
}
