//! # Validation Module
//!
//! Schema validation for documents entering the Local Store.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI / forms (out of scope)                                    │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - collection schema rules                        │
//! │  ├── Applied to CRUD input before the Local Store is touched           │
//! │  └── Applied to documents arriving on the pull channel                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Local Store structural invariants                            │
//! │  └── Unique, immutable ids per collection                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The soft `business_id` reference is deliberately NOT checked against the
//! businesses collection here: orphaned articles are a tolerated state.

use crate::error::ValidationError;
use crate::types::{Article, Business};
use crate::{MAX_ID_LENGTH, MAX_NAME_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a document id.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - Must be at most [`MAX_ID_LENGTH`] characters
pub fn validate_id(id: &str) -> ValidationResult<()> {
    validate_required_string("id", id, MAX_ID_LENGTH)
}

/// Validates a display name.
pub fn validate_name(name: &str) -> ValidationResult<()> {
    validate_required_string("name", name, MAX_NAME_LENGTH)
}

/// Validates a quantity.
///
/// Negative stock is rejected; zero is fine (sold out).
pub fn validate_qty(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::Negative {
            field: "qty".to_string(),
        });
    }
    Ok(())
}

/// Validates a selling price.
///
/// ## Rules
/// - Must be a finite number (no NaN / infinity from bad JSON)
/// - Must not be negative
pub fn validate_selling_price(price: f64) -> ValidationResult<()> {
    if !price.is_finite() {
        return Err(ValidationError::InvalidNumber {
            field: "selling_price".to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    if price < 0.0 {
        return Err(ValidationError::Negative {
            field: "selling_price".to_string(),
        });
    }
    Ok(())
}

fn validate_required_string(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Document Validators
// =============================================================================

/// Validates a complete [`Business`] document.
pub fn validate_business(business: &Business) -> ValidationResult<()> {
    validate_id(&business.id)?;
    validate_name(&business.name)?;
    Ok(())
}

/// Validates a complete [`Article`] document.
pub fn validate_article(article: &Article) -> ValidationResult<()> {
    validate_id(&article.id)?;
    validate_name(&article.name)?;
    validate_qty(article.qty)?;
    validate_selling_price(article.selling_price)?;
    validate_required_string("business_id", &article.business_id, MAX_ID_LENGTH)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("b1").is_ok());
        assert!(validate_id("  ").is_err());
        assert!(validate_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_qty() {
        assert!(validate_qty(0).is_ok());
        assert!(validate_qty(5).is_ok());
        assert!(validate_qty(-1).is_err());
    }

    #[test]
    fn test_validate_selling_price() {
        assert!(validate_selling_price(9.99).is_ok());
        assert!(validate_selling_price(0.0).is_ok());
        assert!(validate_selling_price(-0.01).is_err());
        assert!(validate_selling_price(f64::NAN).is_err());
        assert!(validate_selling_price(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_business() {
        assert!(validate_business(&Business::with_id("b1", "Acme")).is_ok());
        assert!(validate_business(&Business::with_id("b1", "")).is_err());
        assert!(validate_business(&Business::with_id("", "Acme")).is_err());
    }

    #[test]
    fn test_validate_article() {
        let ok = Article::with_id("a1", "Widget", 5, 9.99, "b1");
        assert!(validate_article(&ok).is_ok());

        let bad_qty = Article::with_id("a1", "Widget", -5, 9.99, "b1");
        assert!(validate_article(&bad_qty).is_err());

        let no_owner = Article::with_id("a1", "Widget", 5, 9.99, "");
        assert!(validate_article(&no_owner).is_err());
    }
}
