use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::cmp::Ordering;
use std::io;
use std::sync::OnceLock;

use crate::error::MatchError;

/// 应收发票 (不可变)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    serial: i64,
    issue_date: NaiveDate,
    amount: BigDecimal,
}

impl Invoice {
    pub fn new(serial: i64, issue_date: NaiveDate, amount: BigDecimal) -> Self {
        Self {
            serial,
            issue_date,
            amount,
        }
    }

    pub fn serial(&self) -> i64 {
        self.serial
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    /// 仅按金额比较，用于候选集排序
    pub fn cmp_amount(&self, other: &Invoice) -> Ordering {
        self.amount.cmp(&other.amount)
    }
}

/// 合计缓存策略
///
/// `Sticky` 保留旧行为: 合计首次计算后不再更新，即使之后集合被修改。
/// `Invalidate` 在每次修改时丢弃缓存。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalCaching {
    #[default]
    Invalidate,
    Sticky,
}

/// 有序发票集合，允许金额相同的重复发票
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Invoice>", into = "Vec<Invoice>")]
pub struct Invoices {
    items: Vec<Invoice>,
    caching: TotalCaching,
    grand_total: OnceLock<BigDecimal>,
}

impl Invoices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caching(caching: TotalCaching) -> Self {
        Self {
            caching,
            ..Self::default()
        }
    }

    pub fn from_vec(items: Vec<Invoice>, caching: TotalCaching) -> Self {
        Self {
            items,
            caching,
            grand_total: OnceLock::new(),
        }
    }

    pub fn caching(&self) -> TotalCaching {
        self.caching
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Invoice> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Invoice] {
        &self.items
    }

    pub fn push(&mut self, invoice: Invoice) {
        self.items.push(invoice);
        self.touched();
    }

    /// 发票合计 (带缓存)
    pub fn grand_total(&self) -> BigDecimal {
        self.grand_total
            .get_or_init(|| {
                let mut total = BigDecimal::zero();
                for invoice in &self.items {
                    total += invoice.amount();
                }
                total
            })
            .clone()
    }

    /// 开票日期不晚于 `end_date` 的发票子集，不修改原集合
    pub fn up_to_date(&self, end_date: NaiveDate) -> Invoices {
        let items = self
            .items
            .iter()
            .filter(|invoice| invoice.issue_date <= end_date)
            .cloned()
            .collect();
        Invoices::from_vec(items, self.caching)
    }

    /// 从本集合中移除 `other` 中的发票，每次出现移除一条
    ///
    /// 返回实际移除的条数。
    pub fn remove_all(&mut self, other: &Invoices) -> usize {
        let mut removed = 0;
        for invoice in other.iter() {
            if let Some(pos) = self.items.iter().position(|i| i == invoice) {
                self.items.remove(pos);
                removed += 1;
            }
        }
        if removed > 0 {
            self.touched();
        }
        removed
    }

    /// 各发票开票日距 `date` 的天数绝对值之和
    pub fn cumulative_days_from(&self, date: NaiveDate) -> i64 {
        self.items
            .iter()
            .map(|invoice| (date - invoice.issue_date).num_days().abs())
            .sum()
    }

    /// 以一行逗号分隔的金额写出，空集合不输出
    pub fn write_csv<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<(), MatchError> {
        if self.items.is_empty() {
            return Ok(());
        }
        writer.write_record(self.items.iter().map(|i| i.amount.to_string()))?;
        Ok(())
    }

    pub fn into_vec(self) -> Vec<Invoice> {
        self.items
    }

    /// 按金额降序稳定排序
    pub(crate) fn sort_by_amount_desc(&mut self) {
        self.items.sort_by(|a, b| b.cmp_amount(a));
        self.touched();
    }

    fn touched(&mut self) {
        if self.caching == TotalCaching::Invalidate {
            self.grand_total.take();
        }
    }
}

// 复制时不带走合计缓存
impl Clone for Invoices {
    fn clone(&self) -> Self {
        Invoices::from_vec(self.items.clone(), self.caching)
    }
}

impl PartialEq for Invoices {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl From<Vec<Invoice>> for Invoices {
    fn from(items: Vec<Invoice>) -> Self {
        Invoices::from_vec(items, TotalCaching::default())
    }
}

impl From<Invoices> for Vec<Invoice> {
    fn from(invoices: Invoices) -> Self {
        invoices.items
    }
}

impl FromIterator<Invoice> for Invoices {
    fn from_iter<I: IntoIterator<Item = Invoice>>(iter: I) -> Self {
        Invoices::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a Invoices {
    type Item = &'a Invoice;
    type IntoIter = std::slice::Iter<'a, Invoice>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
