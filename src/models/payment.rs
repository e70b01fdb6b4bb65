use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 收款 (搜索目标，不可变)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    reference: String,
    date: NaiveDate,
    amount: BigDecimal,
}

impl Payment {
    pub fn new(reference: impl Into<String>, date: NaiveDate, amount: BigDecimal) -> Self {
        Self {
            reference: reference.into(),
            date,
            amount,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    /// 金额必须为正才能作为匹配目标
    pub fn is_valid_target(&self) -> bool {
        self.amount > BigDecimal::zero()
    }
}
