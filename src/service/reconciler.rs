use indexmap::IndexSet;
use rayon::prelude::*;

use crate::error::MatchError;
use crate::models::{Hits, Invoices, MatchOutcome, Payment, PaymentOutcome, ReconciliationReport};
use crate::service::matcher::{find_hits_with, MatchOptions};

/// 付款核销驱动: 依次为每笔付款匹配发票并核销最佳命中
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: MatchOptions,
}

impl Reconciler {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// 单笔付款匹配
    pub fn match_payment(&self, payment: &Payment, candidates: &Invoices) -> Result<Hits, MatchError> {
        find_hits_with(payment, candidates, &self.options)
    }

    /// 按顺序对账
    ///
    /// 每笔付款只在开票日不晚于付款日的发票中搜索；找到最佳命中后把这些发票从池中移除，
    /// 后续付款不能再使用。单笔付款参数不合法时记为 `Rejected` 并继续处理下一笔。
    /// 参考号与前面付款重复的付款不参与匹配，同样记为 `Rejected`。
    pub fn reconcile(&self, payments: &[Payment], invoices: Invoices) -> ReconciliationReport {
        let mut pool = Invoices::from_vec(invoices.into_vec(), self.options.total_caching);
        let mut report = ReconciliationReport::default();
        let mut seen: IndexSet<&str> = IndexSet::with_capacity(payments.len());

        tracing::info!(
            "开始对账: {} 笔付款, {} 张待核销发票",
            payments.len(),
            pool.len()
        );

        for (idx, payment) in payments.iter().enumerate() {
            let outcome = if seen.insert(payment.reference()) {
                self.settle(payment, &mut pool)
            } else {
                tracing::warn!("付款 {}: 参考号重复, 跳过匹配", payment.reference());
                MatchOutcome::Rejected {
                    reason: format!("duplicate payment reference: {}", payment.reference()),
                }
            };

            if (idx + 1) % 100 == 0 || idx == 0 {
                tracing::info!(
                    "付款进度: {}/{}, 已核销: {}, 剩余发票: {}",
                    idx + 1,
                    payments.len(),
                    report.matched_count() + usize::from(outcome.is_matched()),
                    pool.len()
                );
            }
            report.outcomes.push(PaymentOutcome {
                payment: payment.clone(),
                outcome,
            });
        }

        tracing::info!(
            "对账完成: 付款 {}, 已核销 {}, 未核销发票 {}",
            payments.len(),
            report.matched_count(),
            pool.len()
        );

        report.unmatched_invoices = pool.into_vec();
        report
    }

    fn settle(&self, payment: &Payment, pool: &mut Invoices) -> MatchOutcome {
        let candidates = pool.up_to_date(payment.date());
        if candidates.is_empty() && payment.is_valid_target() {
            tracing::info!(
                "付款 {}: 付款日 {} 前没有未核销发票",
                payment.reference(),
                payment.date()
            );
            return MatchOutcome::Unmatched { candidates: 0 };
        }

        let hits = match self.match_payment(payment, &candidates) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("付款 {} 参数不合法, 已拒绝: {}", payment.reference(), e);
                return MatchOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let Some(best) = hits.best_hit() else {
            tracing::info!(
                "付款 {}: 金额 {} 在 {} 张候选发票中无精确匹配",
                payment.reference(),
                payment.amount(),
                candidates.len()
            );
            return MatchOutcome::Unmatched {
                candidates: candidates.len(),
            };
        };

        pool.remove_all(best.invoices());
        tracing::debug!(
            "付款 {}: 命中 {} 组, 最佳组合 {:?}",
            payment.reference(),
            hits.len(),
            best.serials()
        );
        MatchOutcome::from_best(hits.len(), best)
    }

    /// 并行预览: 每笔付款独立匹配整个池，不核销
    ///
    /// 结果顺序与输入一致。
    pub fn preview(&self, payments: &[Payment], invoices: &Invoices) -> Vec<Result<Hits, MatchError>> {
        payments
            .par_iter()
            .map(|payment| {
                let candidates = invoices.up_to_date(payment.date());
                self.match_payment(payment, &candidates)
            })
            .collect()
    }
}
