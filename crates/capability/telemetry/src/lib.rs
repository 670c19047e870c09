//! 追踪初始化、请求 ID 与采集链路计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 采集链路计数快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub datagrams_received: u64,
    pub decode_failures: u64,
    pub envelopes_enqueued: u64,
    pub backpressure: u64,
    pub identifier_errors: u64,
    pub records_parsed: u64,
    pub records_dropped: u64,
    pub samples_set: u64,
}

/// 采集链路计数器。
pub struct TelemetryMetrics {
    datagrams_received: AtomicU64,
    decode_failures: AtomicU64,
    envelopes_enqueued: AtomicU64,
    backpressure: AtomicU64,
    identifier_errors: AtomicU64,
    records_parsed: AtomicU64,
    records_dropped: AtomicU64,
    samples_set: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            datagrams_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            envelopes_enqueued: AtomicU64::new(0),
            backpressure: AtomicU64::new(0),
            identifier_errors: AtomicU64::new(0),
            records_parsed: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            samples_set: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            envelopes_enqueued: self.envelopes_enqueued.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
            identifier_errors: self.identifier_errors.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            samples_set: self.samples_set.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing：RUST_LOG 优先，否则使用传入的默认级别。
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录收到的 UDP 报文数。
pub fn record_datagram_received() {
    metrics().datagrams_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录 syslog 解码失败次数。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_envelope_enqueued() {
    metrics().envelopes_enqueued.fetch_add(1, Ordering::Relaxed);
}

/// 记录队列满导致的丢弃次数。
pub fn record_backpressure() {
    metrics().backpressure.fetch_add(1, Ordering::Relaxed);
}

pub fn record_identifier_error() {
    metrics().identifier_errors.fetch_add(1, Ordering::Relaxed);
}

pub fn record_record_parsed() {
    metrics().records_parsed.fetch_add(1, Ordering::Relaxed);
}

/// 记录格式错误丢弃的记录数。
pub fn record_record_dropped() {
    metrics().records_dropped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_sample_set() {
    metrics().samples_set.fetch_add(1, Ordering::Relaxed);
}
