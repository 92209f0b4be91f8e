//! Transaction domain entity.
//! Immutable, self-validating representation of a financial transaction.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::validation::{
    validate_amount_digits, validate_max_len, validate_positive_amount, validate_required,
    validate_tags, ValidationError, AMOUNT_SCALE, DESCRIPTION_MAX_LEN,
};

/// Window used by `is_recent` and the recent-transactions filter.
pub const RECENT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "debit", alias = "DEBIT")]
    Debit,
    #[serde(rename = "credit", alias = "CREDIT")]
    Credit,
    #[serde(rename = "transfer", alias = "TRANSFER")]
    Transfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 3] = [
        TransactionType::Debit,
        TransactionType::Credit,
        TransactionType::Transfer,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            TransactionType::Debit => "debit",
            TransactionType::Credit => "credit",
            TransactionType::Transfer => "transfer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TransactionType::Debit => "Money going out",
            TransactionType::Credit => "Money coming in",
            TransactionType::Transfer => "Money moving between accounts",
        }
    }

    pub fn is_outgoing(&self) -> bool {
        matches!(self, TransactionType::Debit)
    }

    pub fn is_incoming(&self) -> bool {
        matches!(self, TransactionType::Credit)
    }

    /// Applies the balance sign of this type: debits subtract, credits and
    /// transfers add.
    pub fn sign(&self, amount: &BigDecimal) -> BigDecimal {
        match self {
            TransactionType::Debit => -amount.clone(),
            TransactionType::Credit | TransactionType::Transfer => amount.clone(),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit" => Ok(TransactionType::Debit),
            "credit" => Ok(TransactionType::Credit),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(ValidationError::new(
                "type",
                format!("unknown transaction type: {}", other),
            )),
        }
    }
}

/// Optional descriptive data attached to a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl TransactionMetadata {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.category.is_none() && self.properties.is_empty()
    }
}

impl Hash for TransactionMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.category.hash(state);
        for (key, value) in &self.properties {
            key.hash(state);
            value.to_string().hash(state);
        }
    }
}

/// Unvalidated field bag used for deserialization and bulk input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub id: String,
    pub description: String,
    pub amount: BigDecimal,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "TransactionMetadata::is_empty")]
    pub metadata: TransactionMetadata,
}

/// A validated transaction. Fields cannot change after construction; the
/// `with_*` methods return new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TransactionDraft", into = "TransactionDraft")]
pub struct Transaction {
    id: String,
    description: String,
    amount: BigDecimal,
    timestamp: DateTime<Utc>,
    transaction_type: TransactionType,
    tags: Vec<String>,
    metadata: TransactionMetadata,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        amount: BigDecimal,
        timestamp: DateTime<Utc>,
        transaction_type: TransactionType,
        tags: Vec<String>,
        metadata: TransactionMetadata,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_required("id", &id)?;

        let description = description.into().trim().to_string();
        validate_required("description", &description)?;
        validate_max_len("description", &description, DESCRIPTION_MAX_LEN)?;

        validate_positive_amount(&amount)?;
        validate_amount_digits(&amount)?;

        validate_tags(&tags)?;

        Ok(Self {
            id,
            description,
            amount: amount.with_scale(AMOUNT_SCALE),
            timestamp,
            transaction_type,
            tags,
            metadata,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn metadata(&self) -> &TransactionMetadata {
        &self.metadata
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// True when the timestamp falls within the last 24 hours. Evaluated
    /// against the clock on every call.
    pub fn is_recent(&self) -> bool {
        self.is_recent_at(Utc::now())
    }

    pub fn is_recent_at(&self, now: DateTime<Utc>) -> bool {
        self.timestamp > now - Duration::hours(RECENT_WINDOW_HOURS)
    }

    /// Amount with the balance sign of the transaction type applied.
    pub fn signed_amount(&self) -> BigDecimal {
        self.transaction_type.sign(&self.amount)
    }

    pub fn formatted_amount(&self) -> String {
        match self.transaction_type {
            TransactionType::Debit => format!("-${}", self.amount),
            TransactionType::Credit => format!("+${}", self.amount),
            TransactionType::Transfer => format!("${}", self.amount),
        }
    }

    pub fn with_description(&self, description: impl Into<String>) -> Result<Self, ValidationError> {
        let description = description.into().trim().to_string();
        validate_required("description", &description)?;
        validate_max_len("description", &description, DESCRIPTION_MAX_LEN)?;

        Ok(Self {
            description,
            ..self.clone()
        })
    }

    pub fn with_tags(&self, tags: Vec<String>) -> Result<Self, ValidationError> {
        validate_tags(&tags)?;

        Ok(Self {
            tags,
            ..self.clone()
        })
    }

    pub fn with_metadata(&self, metadata: TransactionMetadata) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }
}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.description.hash(state);
        // amounts are stored at a fixed scale, so the rendering is canonical
        self.amount.to_string().hash(state);
        self.timestamp.hash(state);
        self.transaction_type.hash(state);
        self.tags.hash(state);
        self.metadata.hash(state);
    }
}

impl TryFrom<TransactionDraft> for Transaction {
    type Error = ValidationError;

    fn try_from(draft: TransactionDraft) -> Result<Self, Self::Error> {
        Transaction::new(
            draft.id,
            draft.description,
            draft.amount,
            draft.timestamp,
            draft.transaction_type,
            draft.tags,
            draft.metadata,
        )
    }
}

impl From<Transaction> for TransactionDraft {
    fn from(tx: Transaction) -> Self {
        TransactionDraft {
            id: tx.id,
            description: tx.description,
            amount: tx.amount,
            timestamp: tx.timestamp,
            transaction_type: tx.transaction_type,
            tags: tx.tags,
            metadata: tx.metadata,
        }
    }
}
