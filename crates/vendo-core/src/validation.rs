//! # Validation Module
//!
//! Input validation for values that arrive from chat commands and admin
//! input.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Chat layer                                                   │
//! │  └── Parses text into numbers and codes                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: vendo-engine service call                                    │
//! │  └── THIS MODULE: format and range rules                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger rules (pricing, stock, balance, coupon)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite                                                       │
//! │  ├── CHECK (balance >= 0), CHECK (used_count >= 0)                     │
//! │  └── UNIQUE (coupon code), UNIQUE (ledger reference)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use vendo_core::validation::{validate_coupon_code, validate_topup_amount};
//!
//! validate_coupon_code("HEMAT10").unwrap();
//! validate_topup_amount(50_000, 10_000, 1_000_000).unwrap();
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted coupon code.
pub const MAX_COUPON_CODE_LEN: usize = 32;

/// Longest accepted pool name (`credentials:<product>` included).
pub const MAX_POOL_NAME_LEN: usize = 64;

/// Longest accepted inventory unit (a link or a credential line).
pub const MAX_UNIT_LEN: usize = 2048;

/// Longest accepted admin note or rejection reason.
pub const MAX_NOTE_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a coupon code.
///
/// ## Rules
/// - Must not be empty
/// - At most 32 characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use vendo_core::validation::validate_coupon_code;
///
/// assert!(validate_coupon_code("NEW-YEAR_25").is_ok());
/// assert!(validate_coupon_code("two words").is_err());
/// assert!(validate_coupon_code("").is_err());
/// ```
pub fn validate_coupon_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "coupon code".to_string(),
        });
    }

    if code.chars().count() > MAX_COUPON_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "coupon code".to_string(),
            max: MAX_COUPON_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "coupon code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an inventory pool name.
///
/// Pool names are lower-case words, optionally with one `:` separating a
/// family from a product (`credentials:vpn`).
pub fn validate_pool_name(name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "pool".to_string(),
        });
    }

    if name.len() > MAX_POOL_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "pool".to_string(),
            max: MAX_POOL_NAME_LEN,
        });
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | ':'));
    if !valid_chars || name.matches(':').count() > 1 || name.starts_with(':') || name.ends_with(':')
    {
        return Err(ValidationError::InvalidFormat {
            field: "pool".to_string(),
            reason: "must be lower-case letters, digits, '_' or '-', with at most one ':'"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates one inventory unit and returns it trimmed.
///
/// Returns `Ok(None)` for blank lines so bulk uploads can skip them.
pub fn normalize_unit(unit: &str) -> ValidationResult<Option<String>> {
    let unit = unit.trim();

    if unit.is_empty() {
        return Ok(None);
    }

    if unit.len() > MAX_UNIT_LEN {
        return Err(ValidationError::TooLong {
            field: "unit".to_string(),
            max: MAX_UNIT_LEN,
        });
    }

    Ok(Some(unit.to_string()))
}

/// Validates a free-text note (rejection reason, failure note).
pub fn validate_note(note: &str) -> ValidationResult<()> {
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a requested top-up amount against the configured bounds.
///
/// ## Example
/// ```rust
/// use vendo_core::validation::validate_topup_amount;
///
/// assert!(validate_topup_amount(10_000, 10_000, 1_000_000).is_ok());
/// assert!(validate_topup_amount(9_999, 10_000, 1_000_000).is_err());
/// assert!(validate_topup_amount(0, 10_000, 1_000_000).is_err());
/// ```
pub fn validate_topup_amount(amount: i64, min: i64, max: i64) -> ValidationResult<()> {
    if amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "top-up amount".to_string(),
        });
    }

    if amount < min || amount > max {
        return Err(ValidationError::OutOfRange {
            field: "top-up amount".to_string(),
            min,
            max,
        });
    }

    Ok(())
}

/// Validates a cosmetic display count.
pub fn validate_display_count(count: i64) -> ValidationResult<()> {
    if count < 0 {
        return Err(ValidationError::OutOfRange {
            field: "display count".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_coupon_code() {
        assert!(validate_coupon_code("HEMAT10").is_ok());
        assert!(validate_coupon_code("new-year_2026").is_ok());

        assert!(validate_coupon_code("").is_err());
        assert!(validate_coupon_code("   ").is_err());
        assert!(validate_coupon_code("HEMAT 10").is_err());
        assert!(validate_coupon_code(&"A".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_pool_name() {
        assert!(validate_pool_name("links").is_ok());
        assert!(validate_pool_name("ai_links").is_ok());
        assert!(validate_pool_name("credentials:vpn").is_ok());

        assert!(validate_pool_name("").is_err());
        assert!(validate_pool_name("Links").is_err());
        assert!(validate_pool_name("a:b:c").is_err());
        assert!(validate_pool_name("credentials:").is_err());
    }

    #[test]
    fn test_normalize_unit() {
        assert_eq!(
            normalize_unit("  https://example.test/a  ").unwrap(),
            Some("https://example.test/a".to_string())
        );
        assert_eq!(normalize_unit("   ").unwrap(), None);
        assert!(normalize_unit(&"x".repeat(MAX_UNIT_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_topup_amount() {
        assert!(validate_topup_amount(50_000, 10_000, 1_000_000).is_ok());
        assert!(validate_topup_amount(1_000_000, 10_000, 1_000_000).is_ok());
        assert!(validate_topup_amount(1_000_001, 10_000, 1_000_000).is_err());
        assert!(matches!(
            validate_topup_amount(-5, 10_000, 1_000_000),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_validate_note_and_display_count() {
        assert!(validate_note("blurry proof").is_ok());
        assert!(validate_note(&"x".repeat(MAX_NOTE_LEN + 1)).is_err());
        assert!(validate_display_count(0).is_ok());
        assert!(validate_display_count(-1).is_err());
    }
}
