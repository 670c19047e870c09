//! 指标导出与采集统计。
//!
//! - GET {udp_metrics_path}：Prometheus 文本格式
//! - GET /api/ingest-stats

use api_contract::{ApiResponse, IngestStatsDto};
use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use prusa_telemetry::metrics;
use tracing::warn;

use crate::AppState;

pub async fn udp_metrics(State(state): State<AppState>) -> Response {
    match state.registry.render() {
        Ok(text) => {
            let content_type = HeaderValue::from_str(&state.registry.content_type())
                .unwrap_or_else(|_| HeaderValue::from_static("text/plain; version=0.0.4"));
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], text).into_response()
        }
        Err(err) => {
            warn!(target: "prusa.http", error = %err, "metrics_render_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    "METRICS.ENCODE_FAILED",
                    err.to_string(),
                )),
            )
                .into_response()
        }
    }
}

pub async fn ingest_stats(State(state): State<AppState>) -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(IngestStatsDto {
            datagrams_received: snapshot.datagrams_received,
            decode_failures: snapshot.decode_failures,
            envelopes_enqueued: snapshot.envelopes_enqueued,
            backpressure: snapshot.backpressure,
            identifier_errors: snapshot.identifier_errors,
            records_parsed: snapshot.records_parsed,
            records_dropped: snapshot.records_dropped,
            samples_set: snapshot.samples_set,
            metric_families: state.registry.family_count(),
            registrations: state.registry.registrations(),
            registration_conflicts: state.registry.conflicts(),
        })),
    )
        .into_response()
}
