use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};

use crate::domain::transaction::RECENT_WINDOW_HOURS;
use crate::domain::{Transaction, TransactionType};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm {
    Type(TransactionType),
    After(DateTime<Utc>),
    Before(DateTime<Utc>),
    AmountGreaterThan(BigDecimal),
    Tag(String),
}

impl FilterTerm {
    pub fn matches(&self, tx: &Transaction) -> bool {
        match self {
            FilterTerm::Type(transaction_type) => tx.transaction_type() == *transaction_type,
            FilterTerm::After(bound) => tx.timestamp() > *bound,
            FilterTerm::Before(bound) => tx.timestamp() < *bound,
            FilterTerm::AmountGreaterThan(bound) => tx.amount() > bound,
            FilterTerm::Tag(tag) => tx.has_tag(tag),
        }
    }
}

/// Conjunction of filter terms. Each builder method returns a new filter
/// with one more term; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    terms: Vec<FilterTerm>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transactions from the last 24 hours.
    pub fn recent() -> Self {
        Self::recent_at(Utc::now())
    }

    pub fn recent_at(now: DateTime<Utc>) -> Self {
        Self::new().after(now - Duration::hours(RECENT_WINDOW_HOURS))
    }

    pub fn with_type(self, transaction_type: TransactionType) -> Self {
        self.with_term(FilterTerm::Type(transaction_type))
    }

    pub fn after(self, bound: DateTime<Utc>) -> Self {
        self.with_term(FilterTerm::After(bound))
    }

    pub fn before(self, bound: DateTime<Utc>) -> Self {
        self.with_term(FilterTerm::Before(bound))
    }

    pub fn amount_greater_than(self, bound: BigDecimal) -> Self {
        self.with_term(FilterTerm::AmountGreaterThan(bound))
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.with_term(FilterTerm::Tag(tag.into()))
    }

    pub fn with_term(mut self, term: FilterTerm) -> Self {
        self.terms.push(term);
        self
    }

    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.terms.iter().all(|term| term.matches(tx))
    }

    pub fn into_predicate(self) -> impl Fn(&Transaction) -> bool + Send + Sync {
        move |tx| self.matches(tx)
    }
}
