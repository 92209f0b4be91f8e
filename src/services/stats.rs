use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{Transaction, TransactionType};
use crate::validation::AMOUNT_SCALE;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionStats {
    pub total_count: usize,
    /// Signed sum: debits count negative.
    pub total_amount: BigDecimal,
    /// Unsigned sum of all amounts.
    pub gross_amount: BigDecimal,
    /// Unsigned mean, rounded half-up to two places.
    pub average_amount: BigDecimal,
    pub type_distribution: BTreeMap<TransactionType, u64>,
}

impl TransactionStats {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut total_count = 0usize;
        let mut total_amount = BigDecimal::from(0);
        let mut gross_amount = BigDecimal::from(0);
        let mut type_distribution = BTreeMap::new();

        for tx in records {
            total_count += 1;
            total_amount += tx.signed_amount();
            gross_amount += tx.amount().clone();
            *type_distribution.entry(tx.transaction_type()).or_insert(0) += 1;
        }

        let average_amount = if total_count == 0 {
            BigDecimal::from(0)
        } else {
            round_half_up(
                &(gross_amount.clone() / BigDecimal::from(total_count as u64)),
                AMOUNT_SCALE,
            )
        };

        Self {
            total_count,
            total_amount: total_amount.with_scale(AMOUNT_SCALE),
            gross_amount: gross_amount.with_scale(AMOUNT_SCALE),
            average_amount,
            type_distribution,
        }
    }

    pub fn count_for(&self, transaction_type: TransactionType) -> u64 {
        self.type_distribution
            .get(&transaction_type)
            .copied()
            .unwrap_or(0)
    }
}

/// Rounds to `scale` fractional digits, halves away from zero.
pub fn round_half_up(value: &BigDecimal, scale: i64) -> BigDecimal {
    let half = BigDecimal::from(5) / BigDecimal::from(10u64.pow(scale as u32 + 1));
    if value < &BigDecimal::from(0) {
        (value.clone() - half).with_scale(scale)
    } else {
        (value.clone() + half).with_scale(scale)
    }
}
