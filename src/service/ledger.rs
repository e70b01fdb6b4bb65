use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use sqlx::PgPool;

use crate::db::queries;
use crate::error::ServiceError;
use crate::models::{Invoices, LedgerStats, MatchOutcome, MatchResultRow, ReconciliationReport};
use crate::service::Reconciler;

/// 按客户从数据库加载发票与付款并落库核销结果
pub struct LedgerReconciler {
    pool: PgPool,
    reconciler: Reconciler,
}

impl LedgerReconciler {
    pub fn new(pool: PgPool, reconciler: Reconciler) -> Self {
        Self { pool, reconciler }
    }

    /// 批量对账入口
    pub async fn batch_reconcile(&self, customer_ids: &[i64]) -> Result<Vec<LedgerStats>, ServiceError> {
        let mut all_stats = Vec::with_capacity(customer_ids.len());

        for &customer_id in customer_ids {
            match self.reconcile_customer(customer_id).await {
                Ok(stats) => all_stats.push(stats),
                Err(e) => {
                    tracing::error!("客户 {} 对账失败: {}", customer_id, e);
                    return Err(e);
                }
            }
        }

        Ok(all_stats)
    }

    /// 单个客户对账
    pub async fn reconcile_customer(&self, customer_id: i64) -> Result<LedgerStats, ServiceError> {
        // Phase 1: 加载数据
        let invoices = queries::list_open_invoices(&self.pool, customer_id).await?;
        let payments = queries::list_payments(&self.pool, customer_id).await?;

        tracing::info!(
            "客户 {}: {} 张未核销发票, {} 笔付款",
            customer_id,
            invoices.len(),
            payments.len()
        );

        if payments.is_empty() {
            return Ok(LedgerStats {
                customer_id,
                total_payments: 0,
                matched_payments: 0,
                matched_invoices: 0,
                total_matched_amount: BigDecimal::zero(),
                remaining_invoices: invoices.len(),
            });
        }

        // Phase 2: 匹配 (搜索为纯 CPU 计算，放到阻塞线程池)
        let reconciler = self.reconciler.clone();
        let report = tokio::task::spawn_blocking(move || {
            reconciler.reconcile(&payments, Invoices::from(invoices))
        })
        .await?;

        // Phase 3: 落库 (结果行与状态更新在同一事务内提交)
        let rows = result_rows(customer_id, &report);
        let serials: Vec<i64> = rows.iter().map(|r| r.finvoiceserial).collect();
        let references = matched_references(&report);

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(1000) {
            queries::insert_batch(&mut *tx, chunk).await?;
        }
        if !serials.is_empty() {
            queries::close_invoices(&mut *tx, customer_id, &serials).await?;
            queries::mark_reconciled(&mut *tx, customer_id, &references).await?;
        }
        tx.commit().await?;

        let stats = ledger_stats(customer_id, &report, rows.len());
        tracing::info!(
            "客户 {}: 对账完成 - 付款 {}/{}, 核销发票 {}, 剩余发票 {}",
            customer_id,
            stats.matched_payments,
            stats.total_payments,
            stats.matched_invoices,
            stats.remaining_invoices
        );

        Ok(stats)
    }
}

/// 把对账报告展开为结果表行，每张核销发票一行
pub fn result_rows(customer_id: i64, report: &ReconciliationReport) -> Vec<MatchResultRow> {
    let match_time = Utc::now();
    let mut rows = Vec::new();

    for entry in &report.outcomes {
        let MatchOutcome::Matched { hit_count, invoices, .. } = &entry.outcome else {
            continue;
        };
        let payment = &entry.payment;
        for invoice in invoices {
            rows.push(MatchResultRow {
                fcustomerid: customer_id,
                fpaymentref: payment.reference().to_string(),
                fpaymentdate: payment.date(),
                fpaymentamount: payment.amount().clone(),
                finvoiceserial: invoice.serial(),
                finvoicedate: invoice.issue_date(),
                finvoiceamount: invoice.amount().clone(),
                fhitcount: i32::try_from(*hit_count).unwrap_or(i32::MAX),
                fmatchtime: match_time,
            });
        }
    }

    rows
}

/// 已核销付款的参考号
pub fn matched_references(report: &ReconciliationReport) -> Vec<String> {
    report
        .outcomes
        .iter()
        .filter(|entry| entry.outcome.is_matched())
        .map(|entry| entry.payment.reference().to_string())
        .collect()
}

pub fn ledger_stats(customer_id: i64, report: &ReconciliationReport, matched_invoices: usize) -> LedgerStats {
    let mut total_matched_amount = BigDecimal::zero();
    for entry in &report.outcomes {
        if let MatchOutcome::Matched { total, .. } = &entry.outcome {
            total_matched_amount += total;
        }
    }

    LedgerStats {
        customer_id,
        total_payments: report.outcomes.len(),
        matched_payments: report.matched_count(),
        matched_invoices,
        total_matched_amount,
        remaining_invoices: report.unmatched_invoices.len(),
    }
}
