pub mod data;

pub use data::{Envelope, FieldValue, Point};

/// 字段键为 `v` 或 `value` 时直接使用 measurement 作为指标名。
pub const BARE_VALUE_KEYS: [&str; 2] = ["v", "value"];

/// 由 measurement 与字段键推导指标名。
pub fn metric_name(measurement: &str, field_key: &str) -> String {
    if BARE_VALUE_KEYS.contains(&field_key) {
        measurement.to_string()
    } else {
        format!("{}_{}", measurement, field_key)
    }
}
