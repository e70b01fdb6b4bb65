use crate::models::{Invoice, MatchResultRow, Payment};
use bigdecimal::BigDecimal;
use sqlx::{PgConnection, PgPool};
use std::path::Path;

/// 查询客户的未核销发票 (按开票日期升序)
pub async fn list_open_invoices(
    pool: &PgPool,
    customer_id: i64,
) -> Result<Vec<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(
        r#"
        SELECT fserial as serial,
               fissuedate as issue_date,
               famount as amount
        FROM t_ar_invoice
        WHERE fcustomerid = $1
          AND fstatus = 'open'
        ORDER BY fissuedate ASC, fserial ASC
        "#
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

/// 查询客户的待对账付款 (按付款日期升序)
pub async fn list_payments(
    pool: &PgPool,
    customer_id: i64,
) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT freference as reference,
               fdate as date,
               famount as amount
        FROM t_ar_payment
        WHERE fcustomerid = $1
          AND freconciled = false
        ORDER BY fdate ASC, freference ASC
        "#
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

/// 批量插入匹配结果
///
/// 写操作都接收连接而不是连接池，调用方在同一事务内执行。
pub async fn insert_batch(
    conn: &mut PgConnection,
    results: &[MatchResultRow],
) -> Result<(), sqlx::Error> {
    if results.is_empty() {
        return Ok(());
    }

    tracing::debug!("开始构建批量插入语句, {} 条记录", results.len());
    let start_time = std::time::Instant::now();

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO t_ar_match_result (
            fcustomerid, fpaymentref, fpaymentdate, fpaymentamount,
            finvoiceserial, finvoicedate, finvoiceamount,
            fhitcount, fmatchtime
        ) "
    );

    query_builder.push_values(results, |mut b, result| {
        b.push_bind(result.fcustomerid)
            .push_bind(&result.fpaymentref)
            .push_bind(result.fpaymentdate)
            .push_bind(result.fpaymentamount.clone())
            .push_bind(result.finvoiceserial)
            .push_bind(result.finvoicedate)
            .push_bind(result.finvoiceamount.clone())
            .push_bind(result.fhitcount)
            .push_bind(result.fmatchtime);
    });

    tracing::debug!("SQL构建完成, 耗时: {:?}", start_time.elapsed());

    let execute_start = std::time::Instant::now();

    // 超时控制: 30秒
    let execute_result = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        query_builder.build().execute(&mut *conn)
    ).await;

    match execute_result {
        Ok(Ok(result)) => {
            tracing::info!("✓ INSERT执行成功, 影响 {} 行, 耗时: {:?}", result.rows_affected(), execute_start.elapsed());
            Ok(())
        },
        Ok(Err(e)) => {
            tracing::error!("✗ INSERT执行失败, 耗时: {:?}, 错误: {:?}", execute_start.elapsed(), e);
            Err(e)
        },
        Err(_) => {
            tracing::error!("✗ INSERT操作超时 (>30秒)!");
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}

/// 将已核销发票标记为 closed
pub async fn close_invoices(
    conn: &mut PgConnection,
    customer_id: i64,
    serials: &[i64],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE t_ar_invoice
        SET fstatus = 'closed'
        WHERE fcustomerid = $1
          AND fserial = ANY($2)
        "#
    )
    .bind(customer_id)
    .bind(serials)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// 将付款标记为已对账
pub async fn mark_reconciled(
    conn: &mut PgConnection,
    customer_id: i64,
    references: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE t_ar_payment
        SET freconciled = true
        WHERE fcustomerid = $1
          AND freference = ANY($2)
        "#
    )
    .bind(customer_id)
    .bind(references)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

fn amount_to_csv(val: &BigDecimal) -> String {
    val.to_string()
}

/// 导出匹配结果到 CSV 文件（PostgreSQL COPY 兼容格式）
pub fn export_to_csv(
    results: &[MatchResultRow],
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use csv::Writer;
    use std::fs::File;

    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    for result in results {
        writer.write_record(&[
            result.fcustomerid.to_string(),
            result.fpaymentref.clone(),
            result.fpaymentdate.to_string(),
            amount_to_csv(&result.fpaymentamount),
            result.finvoiceserial.to_string(),
            result.finvoicedate.to_string(),
            amount_to_csv(&result.finvoiceamount),
            result.fhitcount.to_string(),
            result.fmatchtime.to_rfc3339(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
