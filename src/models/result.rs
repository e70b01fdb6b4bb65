use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Hit, Invoice, Payment};

/// 单笔付款的对账结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// 找到最佳命中，相应发票已从待核销池中移除
    Matched {
        hit_count: usize,
        invoices: Vec<Invoice>,
        total: BigDecimal,
        days_outstanding: i64,
    },
    /// 没有金额恰好相等的发票组合
    Unmatched { candidates: usize },
    /// 付款本身不能作为匹配目标 (如金额非正)
    Rejected { reason: String },
}

impl MatchOutcome {
    pub fn from_best(hit_count: usize, best: &Hit) -> Self {
        MatchOutcome::Matched {
            hit_count,
            invoices: best.invoices().as_slice().to_vec(),
            total: best.grand_total(),
            days_outstanding: best.days_outstanding(),
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// 报告中的一条记录: 付款及其结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

/// 一批付款的对账报告
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// 每笔付款一条，顺序与输入一致 (参考号重复的付款也各占一条)
    pub outcomes: Vec<PaymentOutcome>,
    /// 对账结束后仍未核销的发票
    pub unmatched_invoices: Vec<Invoice>,
}

impl ReconciliationReport {
    pub fn matched_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_matched()).count()
    }

    /// 按参考号查找第一笔付款的结果
    pub fn outcome(&self, reference: &str) -> Option<&MatchOutcome> {
        self.outcomes
            .iter()
            .find(|entry| entry.payment.reference() == reference)
            .map(|entry| &entry.outcome)
    }
}

/// 匹配结果表 (t_ar_match_result)，每张核销发票一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResultRow {
    pub fcustomerid: i64,
    pub fpaymentref: String,
    pub fpaymentdate: NaiveDate,
    pub fpaymentamount: BigDecimal,
    pub finvoiceserial: i64,
    pub finvoicedate: NaiveDate,
    pub finvoiceamount: BigDecimal,
    pub fhitcount: i32,
    pub fmatchtime: DateTime<Utc>,
}

/// 按客户对账统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub customer_id: i64,
    pub total_payments: usize,
    pub matched_payments: usize,
    pub matched_invoices: usize,
    pub total_matched_amount: BigDecimal,
    pub remaining_invoices: usize,
}
