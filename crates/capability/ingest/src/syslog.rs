//! syslog 报文解码（RFC 3164 / RFC 5424）。
//!
//! 只提取 hostname 与正文；正文保持原样，不拆 TAG，
//! 固件写在首行的序号由拆帧阶段处理。

use crate::IngestError;
use domain::Envelope;
use std::net::SocketAddr;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// 报文格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogFormat {
    Rfc3164,
    Rfc5424,
}

/// 解码后的 syslog 报文。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogMessage {
    pub format: SyslogFormat,
    pub priority: u8,
    pub hostname: Option<String>,
    pub message: String,
}

impl SyslogMessage {
    /// 结合对端地址构造信封。
    pub fn into_envelope(self, peer: SocketAddr) -> Envelope {
        Envelope {
            device_id: self.hostname,
            source_address: Some(peer.to_string()),
            body: self.message,
        }
    }
}

/// 解码一个 UDP 报文。
pub fn decode(datagram: &[u8]) -> Result<SyslogMessage, IngestError> {
    let text = String::from_utf8_lossy(datagram);
    let text = text.trim_end_matches(['\n', '\r', '\0']);

    let (priority, rest) = parse_priority(text)?;
    if let Some(rest) = strip_version(rest) {
        parse_rfc5424(priority, rest)
    } else {
        parse_rfc3164(priority, rest)
    }
}

fn parse_priority(text: &str) -> Result<(u8, &str), IngestError> {
    let body = text
        .strip_prefix('<')
        .ok_or_else(|| IngestError::Decode("missing priority".to_string()))?;
    let end = body
        .find('>')
        .filter(|end| (1..=3).contains(end))
        .ok_or_else(|| IngestError::Decode("malformed priority".to_string()))?;
    let digits = &body[..end];
    if !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(IngestError::Decode(format!("malformed priority: {}", digits)));
    }
    let priority = digits
        .parse::<u8>()
        .ok()
        .filter(|value| *value <= 191)
        .ok_or_else(|| IngestError::Decode(format!("priority out of range: {}", digits)))?;
    Ok((priority, &body[end + 1..]))
}

/// RFC 5424 在 PRI 之后紧跟版本号与空格。
fn strip_version(rest: &str) -> Option<&str> {
    let (version, tail) = rest.split_once(' ')?;
    if version.is_empty() || version.len() > 2 || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if version.starts_with('0') {
        return None;
    }
    Some(tail)
}

fn parse_rfc5424(priority: u8, rest: &str) -> Result<SyslogMessage, IngestError> {
    let mut parts = rest.splitn(6, ' ');
    let _timestamp = parts.next();
    let hostname = parts.next();
    let _app_name = parts.next();
    let _proc_id = parts.next();
    let _msg_id = parts.next();
    let (Some(hostname), Some(remainder)) = (hostname, parts.next()) else {
        return Err(IngestError::Decode("truncated rfc5424 header".to_string()));
    };

    let message = skip_structured_data(remainder)?;
    let message = message.strip_prefix('\u{feff}').unwrap_or(message);

    Ok(SyslogMessage {
        format: SyslogFormat::Rfc5424,
        priority,
        hostname: nil_or_value(hostname),
        message: message.to_string(),
    })
}

/// 跳过 STRUCTURED-DATA，返回其后的正文。
fn skip_structured_data(remainder: &str) -> Result<&str, IngestError> {
    if let Some(after) = remainder.strip_prefix('-') {
        return Ok(after.strip_prefix(' ').unwrap_or(after));
    }
    if !remainder.starts_with('[') {
        return Err(IngestError::Decode("malformed structured data".to_string()));
    }

    let bytes = remainder.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        let mut closed = false;
        i += 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 1,
                b']' => {
                    closed = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        if !closed {
            return Err(IngestError::Decode("unterminated structured data".to_string()));
        }
        i += 1;
    }
    let after = &remainder[i.min(remainder.len())..];
    Ok(after.strip_prefix(' ').unwrap_or(after))
}

fn parse_rfc3164(priority: u8, rest: &str) -> Result<SyslogMessage, IngestError> {
    let rest = skip_bsd_timestamp(rest);
    let (hostname, message) = match rest.split_once(' ') {
        Some((hostname, message)) => (hostname, message),
        None => (rest, ""),
    };
    if hostname.is_empty() {
        return Err(IngestError::Decode("missing hostname".to_string()));
    }

    Ok(SyslogMessage {
        format: SyslogFormat::Rfc3164,
        priority,
        hostname: nil_or_value(hostname),
        message: message.to_string(),
    })
}

/// `Mmm dd hh:mm:ss ` 存在时跳过。
fn skip_bsd_timestamp(rest: &str) -> &str {
    let Some(stamp) = rest.get(..16) else {
        return rest;
    };
    let bytes = stamp.as_bytes();
    let month_ok = stamp.get(..3).is_some_and(|month| MONTHS.contains(&month));
    let day_ok = bytes[3] == b' '
        && (bytes[4] == b' ' || bytes[4].is_ascii_digit())
        && bytes[5].is_ascii_digit()
        && bytes[6] == b' ';
    let time_ok = [7, 8, 10, 11, 13, 14].iter().all(|i| bytes[*i].is_ascii_digit())
        && bytes[9] == b':'
        && bytes[12] == b':'
        && bytes[15] == b' ';
    if month_ok && day_ok && time_ok {
        &rest[16..]
    } else {
        rest
    }
}

fn nil_or_value(value: &str) -> Option<String> {
    if value.is_empty() || value == "-" {
        None
    } else {
        Some(value.to_string())
    }
}
