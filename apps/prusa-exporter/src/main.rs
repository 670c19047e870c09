//! prusa 打印机 syslog 遥测导出服务：UDP 采集 + Prometheus 拉取端点。

mod handlers;
mod ingest;
mod middleware;
mod routes;

use prusa_config::AppConfig;
use prusa_registry::MetricRegistry;
use prusa_telemetry::init_tracing;
use std::sync::Arc;
use tracing::info;

/// HTTP 层共享状态。
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MetricRegistry>,
    pub syslog_addr: String,
    pub udp_metrics_path: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_level);

    let registry = Arc::new(MetricRegistry::new(&config.metric_prefix)?);
    // 绑定失败是唯一的致命错误
    let ingest = ingest::spawn_ingest(&config, registry.clone()).await?;

    let state = AppState {
        registry,
        syslog_addr: ingest.local_addr().to_string(),
        udp_metrics_path: config.udp_metrics_path.clone(),
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(
        target: "prusa.http",
        http_addr = %config.http_addr,
        metrics_path = %config.udp_metrics_path,
        "http_server_started"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ingest.shutdown().await?;
    info!(target: "prusa.http", "exporter_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "prusa.http", error = %err, "shutdown_signal_failed");
    }
}
