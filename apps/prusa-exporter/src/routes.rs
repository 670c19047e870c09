//! 路由定义
//!
//! - 首页：/
//! - 健康检查：/health
//! - 采集统计：/api/ingest-stats
//! - UDP 指标导出：由 PRUSA_UDP_METRICS_PATH 决定（默认 /metrics/udp）

use super::AppState;
use super::handlers::*;
use super::middleware::request_context;
use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

/// 创建完整的 HTTP 路由。
pub fn create_router(state: AppState) -> Router {
    let metrics_path = state.udp_metrics_path.clone();
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/ingest-stats", get(ingest_stats))
        .route(&metrics_path, get(udp_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}
