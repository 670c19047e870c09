//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 与 HTTP 内置路由冲突的路径。
const RESERVED_PATHS: [&str; 3] = ["/", "/health", "/api/ingest-stats"];

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// syslog UDP 监听地址
    pub syslog_addr: String,
    pub http_addr: String,
    /// UDP 指标导出路径
    pub udp_metrics_path: String,
    /// 指标名前缀
    pub metric_prefix: String,
    pub ingest_workers: usize,
    pub ingest_queue_capacity: usize,
    pub log_level: String,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（便于测试）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let syslog_addr =
            read_optional(&lookup, "PRUSA_SYSLOG_ADDR").unwrap_or_else(|| "0.0.0.0:8514".to_string());
        let http_addr =
            read_optional(&lookup, "PRUSA_HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:10009".to_string());
        let udp_metrics_path = read_optional(&lookup, "PRUSA_UDP_METRICS_PATH")
            .unwrap_or_else(|| "/metrics/udp".to_string());
        if !is_routable_path(&udp_metrics_path) || RESERVED_PATHS.contains(&udp_metrics_path.as_str()) {
            return Err(ConfigError::Invalid(
                "PRUSA_UDP_METRICS_PATH".to_string(),
                udp_metrics_path,
            ));
        }
        // 前缀允许为空
        let metric_prefix = lookup("PRUSA_METRIC_PREFIX").unwrap_or_else(|| "prusa_".to_string());
        if !is_valid_prefix(&metric_prefix) {
            return Err(ConfigError::Invalid(
                "PRUSA_METRIC_PREFIX".to_string(),
                metric_prefix,
            ));
        }
        let ingest_workers = read_positive_with_default(&lookup, "PRUSA_INGEST_WORKERS", 4)?;
        let ingest_queue_capacity = read_positive_with_default(&lookup, "PRUSA_INGEST_QUEUE", 1024)?;
        let log_level = read_optional(&lookup, "PRUSA_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            syslog_addr,
            http_addr,
            udp_metrics_path,
            metric_prefix,
            ingest_workers,
            ingest_queue_capacity,
            log_level,
        })
    }
}

fn read_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

/// 读取正整数，缺省时使用默认值。
fn read_positive_with_default<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

/// 路径须为静态路由：以 `/` 开头，无空段，不含路由参数或通配符。
fn is_routable_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    rest.split('/').all(|segment| {
        !segment.is_empty() && !segment.contains(['*', ':', '{', '}'])
    })
}

/// 前缀须能拼出合法的 Prometheus 指标名。
fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        None => true,
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => chars
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == ':'),
        Some(_) => false,
    }
}
