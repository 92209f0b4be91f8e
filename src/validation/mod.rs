use bigdecimal::BigDecimal;
use serde::Serialize;
use std::fmt;

pub const DESCRIPTION_MAX_LEN: usize = 100;
pub const AMOUNT_INTEGER_DIGITS: u32 = 10;
pub const AMOUNT_SCALE: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

/// Length is counted in characters, not bytes.
pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Amounts carry at most `AMOUNT_INTEGER_DIGITS` integer digits and
/// `AMOUNT_SCALE` fractional digits.
pub fn validate_amount_digits(amount: &BigDecimal) -> ValidationResult {
    if amount.with_scale(AMOUNT_SCALE) != *amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} fractional digits", AMOUNT_SCALE),
        ));
    }

    let limit = BigDecimal::from(10u64.pow(AMOUNT_INTEGER_DIGITS));
    if amount.abs() >= limit {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} integer digits", AMOUNT_INTEGER_DIGITS),
        ));
    }

    Ok(())
}

pub fn validate_tags(tags: &[String]) -> ValidationResult {
    for tag in tags {
        validate_required("tags", tag)?;
    }

    Ok(())
}
