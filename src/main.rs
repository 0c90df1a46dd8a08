use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use voucher_matcher::{api, AppConfig, MatchEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式，级别可由 RUST_LOG 覆盖
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env()?;
    info!("Starting server with config: {:?}", config);

    let engine = Arc::new(MatchEngine::new(config.matching.clone())?);

    let app = api::router(engine.clone()).layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/records/{{vouchers,documents,creditors}} - 录入记录");
    info!("  POST /api/match/run                               - 运行一轮候选生成");
    info!("  GET  /api/proposals                               - 活动提案");
    info!("  POST /api/proposals/:id/{{confirm,discard}}         - 决议");
    info!("  GET  /api/audit/export                            - 审计 CSV");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(path) = &config.server.audit_export_path {
        if let Err(e) = engine.export_audit(Path::new(path)) {
            tracing::error!("审计日志导出失败: {}", e);
        }
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
