use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use invoice_match_rust::{api, create_pool, AppConfig, LedgerReconciler, Reconciler};
use tower::ServiceBuilder;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("启动服务, 配置: {:?}", config);

    let reconciler = Reconciler::new(config.matcher.options());

    // 内存匹配路由 (请求体携带付款与发票)
    let match_routes = Router::new()
        .route("/api/match", post(api::match_payment))
        .route("/api/reconcile", post(api::reconcile))
        .route("/api/preview", post(api::preview))
        .with_state(Arc::new(reconciler.clone()));

    let mut app = Router::new()
        .route("/health", get(api::health_check))
        .merge(match_routes);

    // 按客户对账路由 (需要数据库)
    match &config.database.url {
        Some(url) => {
            let pool = create_pool(&config.database, url).await?;
            info!("数据库连接池已创建");

            let ledger_routes = Router::new()
                .route("/api/reconcile/customer", post(api::reconcile_customers))
                .with_state(Arc::new(LedgerReconciler::new(pool, reconciler)));
            app = app.merge(ledger_routes);
        }
        None => warn!("未配置 DATABASE_URL, /api/reconcile/customer 已禁用"),
    }

    let app = app.layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("服务监听 {}", addr);
    info!("API 接口:");
    info!("  POST /api/match               - 单笔付款匹配");
    info!("  POST /api/reconcile           - 顺序对账并核销");
    info!("  POST /api/preview             - 并行预览 (不核销)");
    info!("  POST /api/reconcile/customer  - 按客户对账 (数据库)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
