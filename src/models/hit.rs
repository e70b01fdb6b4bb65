use bigdecimal::BigDecimal;
use std::io;
use std::sync::Arc;

use crate::error::MatchError;
use crate::models::{Invoice, Invoices, Payment};

/// 一个命中: 金额之和恰好等于付款金额的一组发票
#[derive(Debug, Clone)]
pub struct Hit {
    payment: Arc<Payment>,
    invoices: Invoices,
}

impl Hit {
    pub(crate) fn new(payment: Arc<Payment>, invoices: Invoices) -> Self {
        Self { payment, invoices }
    }

    pub fn payment(&self) -> &Payment {
        &self.payment
    }

    pub fn invoices(&self) -> &Invoices {
        &self.invoices
    }

    /// 命中包含的发票张数
    pub fn len(&self) -> usize {
        self.invoices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
    }

    pub fn grand_total(&self) -> BigDecimal {
        self.invoices.grand_total()
    }

    pub fn serials(&self) -> Vec<i64> {
        self.invoices.iter().map(Invoice::serial).collect()
    }

    /// 各发票距付款日的天数之和
    pub fn days_outstanding(&self) -> i64 {
        self.invoices.cumulative_days_from(self.payment.date())
    }

    pub fn into_invoices(self) -> Invoices {
        self.invoices
    }
}

/// 同一笔付款的全部命中，按搜索发现顺序排列
#[derive(Debug, Clone)]
pub struct Hits {
    payment: Arc<Payment>,
    hits: Vec<Hit>,
    nodes_visited: u64,
}

impl Hits {
    pub(crate) fn new(payment: Arc<Payment>) -> Self {
        Self {
            payment,
            hits: Vec::new(),
            nodes_visited: 0,
        }
    }

    pub(crate) fn record(&mut self, invoices: Invoices) {
        self.hits.push(Hit::new(Arc::clone(&self.payment), invoices));
    }

    pub(crate) fn set_nodes_visited(&mut self, nodes: u64) {
        self.nodes_visited = nodes;
    }

    pub fn payment(&self) -> &Payment {
        &self.payment
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Hit> {
        self.hits.get(index)
    }

    /// 搜索树中被访问的节点数
    pub fn nodes_visited(&self) -> u64 {
        self.nodes_visited
    }

    /// 选出最佳命中
    ///
    /// 发票张数多者优先；张数相同取合计较大者；仍相同则保留先发现的。
    /// 没有命中时返回 `None`。
    pub fn best_hit(&self) -> Option<&Hit> {
        let mut best: Option<&Hit> = None;
        for hit in &self.hits {
            best = match best {
                None => Some(hit),
                Some(current) if current.len() == hit.len() => {
                    if current.grand_total() < hit.grand_total() {
                        Some(hit)
                    } else {
                        Some(current)
                    }
                }
                Some(current) if current.len() < hit.len() => Some(hit),
                keep => keep,
            };
        }
        best
    }

    /// 每个命中一行，逗号分隔金额
    pub fn write_csv<W: io::Write>(&self, out: W) -> Result<(), MatchError> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
        for hit in &self.hits {
            hit.invoices.write_csv(&mut writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Hits {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn invoices(amounts: &[i64]) -> Invoices {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Invoice::new(i as i64 + 1, date(), BigDecimal::from(*a)))
            .collect()
    }

    fn hits_of(groups: &[&[i64]]) -> Hits {
        let payment = Arc::new(Payment::new("P-1", date(), BigDecimal::from(10)));
        let mut hits = Hits::new(payment);
        for group in groups {
            hits.record(invoices(group));
        }
        hits
    }

    #[test]
    fn best_hit_of_nothing_is_none() {
        assert!(hits_of(&[]).best_hit().is_none());
    }

    #[test]
    fn more_invoices_wins_regardless_of_order() {
        let hits = hits_of(&[&[10], &[4, 3, 3], &[5, 5]]);
        let best = hits.best_hit().unwrap();
        assert_eq!(best.len(), 3);
    }

    #[test]
    fn equal_count_prefers_larger_total() {
        let hits = hits_of(&[&[1, 2], &[4, 6], &[3, 3]]);
        let best = hits.best_hit().unwrap();
        assert_eq!(best.grand_total(), BigDecimal::from(10));
    }

    #[test]
    fn full_tie_keeps_first_found() {
        let hits = hits_of(&[&[6, 4], &[7, 3]]);
        let best = hits.best_hit().unwrap();
        assert_eq!(best.invoices().as_slice()[0].amount(), &BigDecimal::from(6));
    }

    #[test]
    fn hits_share_the_payment() {
        let hits = hits_of(&[&[10], &[5, 5]]);
        for hit in &hits {
            assert_eq!(hit.payment().reference(), "P-1");
        }
    }

    #[test]
    fn write_csv_is_one_line_per_hit() {
        let hits = hits_of(&[&[6, 3], &[5, 3, 1]]);
        let mut out = Vec::new();
        hits.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "6,3\n5,3,1\n");
    }
}
