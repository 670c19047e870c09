//! Line protocol 解析。
//!
//! 记录格式：`measurement[,tag=value]* field=value[,field=value]* [timestamp]`。
//! 解析器无状态，可并发调用。

use crate::NormalizeError;
use domain::{FieldValue, Point};

/// 扫描状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InsideQuotes,
}

/// 按分隔符切分，忽略引号内与反斜杠转义后的分隔符。
///
/// `keep_empty` 为 false 时丢弃空段（连续空格）。
pub(crate) fn split_unquoted(input: &str, separator: u8, keep_empty: bool) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut segments = Vec::new();
    let mut state = ScanState::Normal;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match (state, bytes[i]) {
            (_, b'\\') => {
                i += 1;
            }
            (ScanState::Normal, b'"') => state = ScanState::InsideQuotes,
            (ScanState::InsideQuotes, b'"') => state = ScanState::Normal,
            (ScanState::Normal, byte) if byte == separator => {
                if keep_empty || start < i {
                    segments.push(&input[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    if start < bytes.len() {
        segments.push(&input[start..]);
    } else if keep_empty {
        segments.push("");
    }
    segments
}

/// 按空格切分顶层段。
pub fn split_segments(line: &str) -> Vec<&str> {
    split_unquoted(line, b' ', false)
}

/// 解析一条记录。
///
/// 时间戳段只做合法性校验，不写入结果。
pub fn parse_line(line: &str) -> Result<Point, NormalizeError> {
    let segments = split_segments(line);
    if segments.len() < 2 || segments.len() > 3 {
        return Err(NormalizeError::Format(format!(
            "expected 2 or 3 segments, got {}: {}",
            segments.len(),
            line
        )));
    }

    let mut head = split_unquoted(segments[0], b',', true).into_iter();
    let measurement = head.next().unwrap_or_default();
    if measurement.is_empty() {
        return Err(NormalizeError::Format(format!("empty measurement: {}", line)));
    }

    let mut point = Point::new(measurement);
    for tag in head {
        let (key, value) = split_pair(tag)
            .ok_or_else(|| NormalizeError::Format(format!("invalid tag: {}", tag)))?;
        point.tags.insert(key.to_string(), value.to_string());
    }

    for field in split_unquoted(segments[1], b',', true) {
        let (key, value) = split_pair(field)
            .ok_or_else(|| NormalizeError::Format(format!("invalid field: {}", field)))?;
        point.fields.insert(key.to_string(), parse_field_value(value));
    }

    if let Some(timestamp) = segments.get(2) {
        timestamp
            .parse::<i64>()
            .map_err(|_| NormalizeError::Format(format!("invalid timestamp: {}", timestamp)))?;
    }

    Ok(point)
}

fn split_pair(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// 推断字段值类型：整数 -> 布尔 -> 浮点 -> 引号字符串 -> 原样字符串。
pub fn parse_field_value(raw: &str) -> FieldValue {
    if let Some(digits) = raw.strip_suffix('i') {
        if let Ok(value) = digits.parse::<i64>() {
            return FieldValue::I64(value);
        }
    }

    match raw {
        "true" => return FieldValue::Bool(true),
        "false" => return FieldValue::Bool(false),
        _ => {}
    }

    if let Ok(value) = raw.parse::<f64>() {
        return FieldValue::F64(value);
    }

    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return FieldValue::String(unescape(&raw[1..raw.len() - 1]));
    }

    FieldValue::String(raw.to_string())
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(next @ ('"' | '\\')) => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}
