use crate::error::ServiceError;
use crate::models::{Hit, Invoice, Invoices, LedgerStats, Payment, ReconciliationReport};
use crate::service::{LedgerReconciler, Reconciler};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 请求体: 单笔付款 + 候选发票
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub payment: Payment,
    pub invoices: Vec<Invoice>,
}

/// 请求体: 付款列表 + 发票池
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub payments: Vec<Payment>,
    pub invoices: Vec<Invoice>,
}

/// 请求体: 客户ID列表
#[derive(Debug, Deserialize)]
pub struct CustomerBatchRequest {
    pub customer_ids: Vec<i64>,
}

/// 单个命中的输出形式
#[derive(Debug, Serialize)]
pub struct HitView {
    pub invoices: Vec<Invoice>,
    pub total: BigDecimal,
    pub days_outstanding: i64,
}

impl From<&Hit> for HitView {
    fn from(hit: &Hit) -> Self {
        Self {
            invoices: hit.invoices().as_slice().to_vec(),
            total: hit.grand_total(),
            days_outstanding: hit.days_outstanding(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub success: bool,
    pub message: String,
    pub hits: Vec<HitView>,
    pub best_hit: Option<HitView>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub success: bool,
    pub message: String,
    pub report: Option<ReconciliationReport>,
}

#[derive(Debug, Serialize)]
pub struct PaymentPreview {
    pub reference: String,
    pub hit_count: usize,
    pub best_hit: Option<HitView>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    pub message: String,
    pub previews: Vec<PaymentPreview>,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub success: bool,
    pub message: String,
    pub stats: Option<Vec<LedgerStats>>,
}

fn error_status(e: &ServiceError) -> StatusCode {
    if e.is_invalid_argument() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 单笔付款匹配接口: 返回全部命中与最佳命中
pub async fn match_payment(
    State(reconciler): State<Arc<Reconciler>>,
    Json(req): Json<MatchRequest>,
) -> Response {
    let reference = req.payment.reference().to_string();
    let result = tokio::task::spawn_blocking(move || {
        let candidates = Invoices::from_vec(req.invoices, reconciler.options().total_caching);
        reconciler.match_payment(&req.payment, &candidates)
    })
    .await
    .map_err(ServiceError::from)
    .and_then(|r| r.map_err(ServiceError::from));

    match result {
        Ok(hits) => {
            let response = MatchResponse {
                success: true,
                message: format!("Payment {} has {} hits", reference, hits.len()),
                hits: hits.iter().map(HitView::from).collect(),
                best_hit: hits.best_hit().map(HitView::from),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let response = MatchResponse {
                success: false,
                message: format!("Error: {}", e),
                hits: Vec::new(),
                best_hit: None,
            };
            (error_status(&e), Json(response)).into_response()
        }
    }
}

/// 顺序对账接口: 逐笔匹配并核销
pub async fn reconcile(
    State(reconciler): State<Arc<Reconciler>>,
    Json(req): Json<ReconcileRequest>,
) -> Response {
    let payment_count = req.payments.len();
    let result = tokio::task::spawn_blocking(move || {
        reconciler.reconcile(&req.payments, Invoices::from(req.invoices))
    })
    .await;

    match result {
        Ok(report) => {
            let response = ReconcileResponse {
                success: true,
                message: format!(
                    "Reconciled {} payments, {} matched, {} invoices left open",
                    payment_count,
                    report.matched_count(),
                    report.unmatched_invoices.len()
                ),
                report: Some(report),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let response = ReconcileResponse {
                success: false,
                message: format!("Error: {}", e),
                report: None,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}

/// 并行预览接口: 每笔付款独立匹配，不核销
pub async fn preview(
    State(reconciler): State<Arc<Reconciler>>,
    Json(req): Json<ReconcileRequest>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let invoices = Invoices::from(req.invoices);
        let results = reconciler.preview(&req.payments, &invoices);
        req.payments
            .iter()
            .zip(results)
            .map(|(payment, result)| match result {
                Ok(hits) => PaymentPreview {
                    reference: payment.reference().to_string(),
                    hit_count: hits.len(),
                    best_hit: hits.best_hit().map(HitView::from),
                    error: None,
                },
                Err(e) => PaymentPreview {
                    reference: payment.reference().to_string(),
                    hit_count: 0,
                    best_hit: None,
                    error: Some(e.to_string()),
                },
            })
            .collect::<Vec<_>>()
    })
    .await;

    match result {
        Ok(previews) => {
            let response = PreviewResponse {
                success: true,
                message: format!("Previewed {} payments", previews.len()),
                previews,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let response = PreviewResponse {
                success: false,
                message: format!("Error: {}", e),
                previews: Vec::new(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}

/// 按客户批量对账接口 (读写数据库)
pub async fn reconcile_customers(
    State(ledger): State<Arc<LedgerReconciler>>,
    Json(req): Json<CustomerBatchRequest>,
) -> Response {
    match ledger.batch_reconcile(&req.customer_ids).await {
        Ok(stats) => {
            let matched: usize = stats.iter().map(|s| s.matched_payments).sum();
            let invoices: usize = stats.iter().map(|s| s.matched_invoices).sum();

            let response = LedgerResponse {
                success: true,
                message: format!(
                    "Reconciled {} customers, {} payments matched, {} invoices closed",
                    req.customer_ids.len(), matched, invoices
                ),
                stats: Some(stats),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let response = LedgerResponse {
                success: false,
                message: format!("Error: {}", e),
                stats: None,
            };
            (error_status(&e), Json(response)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    fn reconciler() -> State<Arc<Reconciler>> {
        State(Arc::new(Reconciler::default()))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn invoices_json() -> Value {
        serde_json::json!([
            {"serial": 1, "issue_date": "2024-01-05", "amount": "1"},
            {"serial": 2, "issue_date": "2024-01-06", "amount": "3"},
            {"serial": 3, "issue_date": "2024-01-07", "amount": "5"},
            {"serial": 4, "issue_date": "2024-01-08", "amount": "6"}
        ])
    }

    #[tokio::test]
    async fn match_returns_hits_and_best_hit() {
        let req: MatchRequest = serde_json::from_value(serde_json::json!({
            "payment": {"reference": "BANK-1", "date": "2024-01-31", "amount": "9"},
            "invoices": invoices_json()
        }))
        .unwrap();

        let response = match_payment(reconciler(), Json(req)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["hits"].as_array().unwrap().len(), 2);
        assert_eq!(body["best_hit"]["invoices"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn match_rejects_non_positive_payment() {
        let req: MatchRequest = serde_json::from_value(serde_json::json!({
            "payment": {"reference": "BANK-0", "date": "2024-01-31", "amount": "0"},
            "invoices": invoices_json()
        }))
        .unwrap();

        let response = match_payment(reconciler(), Json(req)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn reconcile_reports_outcomes_in_order() {
        let req: ReconcileRequest = serde_json::from_value(serde_json::json!({
            "payments": [
                {"reference": "A", "date": "2024-01-31", "amount": "9"},
                {"reference": "B", "date": "2024-01-31", "amount": "6"},
                {"reference": "C", "date": "2024-01-31", "amount": "100"}
            ],
            "invoices": invoices_json()
        }))
        .unwrap();

        let response = reconcile(reconciler(), Json(req)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let outcomes = body["report"]["outcomes"].as_array().unwrap();
        let listed: Vec<(&str, &str)> = outcomes
            .iter()
            .map(|o| (o["payment"]["reference"].as_str().unwrap(), o["status"].as_str().unwrap()))
            .collect();
        assert_eq!(listed, vec![("A", "matched"), ("B", "matched"), ("C", "unmatched")]);
    }

    #[tokio::test]
    async fn preview_flags_invalid_payments() {
        let req: ReconcileRequest = serde_json::from_value(serde_json::json!({
            "payments": [
                {"reference": "A", "date": "2024-01-31", "amount": "9"},
                {"reference": "NEG", "date": "2024-01-31", "amount": "-9"}
            ],
            "invoices": invoices_json()
        }))
        .unwrap();

        let response = preview(reconciler(), Json(req)).await;
        let body = body_json(response).await;
        let previews = body["previews"].as_array().unwrap();

        assert_eq!(previews[0]["hit_count"], 2);
        assert!(previews[0]["error"].is_null());
        assert!(previews[1]["error"].as_str().unwrap().contains("invalid argument"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(health_check().await, "OK");
    }
}
