//! 报文拆帧：信封 -> 带设备标签的记录行。

use crate::NormalizeError;
use domain::Envelope;
use std::net::SocketAddr;

/// 设备身份（MAC 派生 hostname + 对端主机地址）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac: String,
    /// 对端地址中的主机部分（不含端口）
    pub address: String,
}

/// 从信封中提取设备身份，缺失任一项时整条信封作废。
pub fn identify(envelope: &Envelope) -> Result<DeviceIdentity, NormalizeError> {
    let mac = envelope
        .device_id
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| NormalizeError::Identifier("missing device id".to_string()))?;
    let source = envelope
        .source_address
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| NormalizeError::Identifier("missing source address".to_string()))?;

    Ok(DeviceIdentity {
        mac: mac.to_string(),
        address: host_part(source),
    })
}

/// 取 `host:port` 中的主机部分，兼容 IPv6。
pub fn host_part(source: &str) -> String {
    if let Ok(addr) = source.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    match source.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            host.to_string()
        }
        _ => source.to_string(),
    }
}

/// 拆分正文并按固件批次规则重排。
///
/// 第一行首个 token 是递增序号，其余部分属于上一批次的尾部，被移到末尾：
/// `[line1, ..., lineN, stripped_line0]`。CRLF 分行时去掉行尾 `\r`。
pub fn rotate_lines(body: &str) -> Vec<&str> {
    let mut lines = body
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));
    let first = lines.next().unwrap_or_default();
    let stripped = first.split_once(' ').map(|(_, rest)| rest).unwrap_or("");

    let mut ordered: Vec<&str> = lines.collect();
    ordered.push(stripped);
    ordered
}

/// 改写首个 token：加前缀并在 measurement 之后注入设备标签。
pub fn tag_line(line: &str, prefix: &str, identity: &DeviceIdentity) -> Result<String, NormalizeError> {
    if line.split_whitespace().next().is_none() {
        return Err(NormalizeError::Format("empty record".to_string()));
    }

    let (head, rest) = match line.split_once(' ') {
        Some((head, rest)) => (head, Some(rest)),
        None => (line, None),
    };
    let (measurement, tags) = match head.split_once(',') {
        Some((measurement, tags)) => (measurement, Some(tags)),
        None => (head, None),
    };

    let mut out = format!(
        "{}{},printer_mac={},printer_address={}",
        prefix, measurement, identity.mac, identity.address
    );
    if let Some(tags) = tags {
        out.push(',');
        out.push_str(tags);
    }
    if let Some(rest) = rest {
        out.push(' ');
        out.push_str(rest);
    }
    Ok(out)
}

/// 信封拆帧结果：设备身份 + 每行独立的改写结果。
#[derive(Debug)]
pub struct Frame {
    pub identity: DeviceIdentity,
    pub records: Vec<Result<String, NormalizeError>>,
}

/// 将信封拆成带设备标签的记录行。单行失败不影响其余行。
pub fn decompose(envelope: &Envelope, prefix: &str) -> Result<Frame, NormalizeError> {
    let identity = identify(envelope)?;
    let records = rotate_lines(&envelope.body)
        .into_iter()
        .map(|line| tag_line(line, prefix, &identity))
        .collect();
    Ok(Frame { identity, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            mac: "ABC123".to_string(),
            address: "192.168.1.100".to_string(),
        }
    }

    #[test]
    fn rotates_multi_line_body() {
        let lines = rotate_lines("12345 temp_noz v=1 111\ntemp_bed v=2 222");
        assert_eq!(lines, vec!["temp_bed v=2 222", "temp_noz v=1 111"]);
    }

    #[test]
    fn rotates_single_line_body() {
        let lines = rotate_lines("12345 temp_noz v=220.5 1637000000");
        assert_eq!(lines, vec!["temp_noz v=220.5 1637000000"]);
    }

    #[test]
    fn strips_carriage_returns() {
        let lines = rotate_lines("12345 temp_noz v=1 111\r\ntemp_bed v=2 222\r\n");
        assert_eq!(lines, vec!["temp_bed v=2 222", "", "temp_noz v=1 111"]);
    }

    #[test]
    fn sequence_token_only_leaves_empty_tail() {
        assert_eq!(rotate_lines("12345"), vec![""]);
        assert_eq!(rotate_lines(""), vec![""]);
        assert_eq!(rotate_lines("7\nfan rpm=1i"), vec!["fan rpm=1i", ""]);
    }

    #[test]
    fn injects_device_tags_before_existing_tags() {
        let line = tag_line("fan,type=print rpm=1500i 1637000000", "prusa_", &identity())
            .expect("tagged");
        assert_eq!(
            line,
            "prusa_fan,printer_mac=ABC123,printer_address=192.168.1.100,type=print rpm=1500i 1637000000"
        );
    }

    #[test]
    fn tags_plain_measurement() {
        let line = tag_line("temp_noz v=220.5", "", &identity()).expect("tagged");
        assert_eq!(line, "temp_noz,printer_mac=ABC123,printer_address=192.168.1.100 v=220.5");
    }

    #[test]
    fn empty_line_is_format_error() {
        assert!(matches!(tag_line("", "prusa_", &identity()), Err(NormalizeError::Format(_))));
        assert!(matches!(tag_line("   ", "prusa_", &identity()), Err(NormalizeError::Format(_))));
    }

    #[test]
    fn host_part_strips_port() {
        assert_eq!(host_part("192.168.1.100:8514"), "192.168.1.100");
        assert_eq!(host_part("[fe80::1]:8514"), "fe80::1");
        assert_eq!(host_part("printer.local:514"), "printer.local");
        assert_eq!(host_part("10.0.0.5"), "10.0.0.5");
    }

    #[test]
    fn missing_identity_rejects_envelope() {
        let mut envelope = Envelope::new("ABC123", "192.168.1.100:54321", "1 fan rpm=1i");
        envelope.device_id = None;
        assert!(matches!(decompose(&envelope, "prusa_"), Err(NormalizeError::Identifier(_))));

        let mut envelope = Envelope::new("ABC123", "192.168.1.100:54321", "1 fan rpm=1i");
        envelope.source_address = None;
        assert!(matches!(decompose(&envelope, "prusa_"), Err(NormalizeError::Identifier(_))));

        let envelope = Envelope::new("", "192.168.1.100:54321", "1 fan rpm=1i");
        assert!(matches!(decompose(&envelope, "prusa_"), Err(NormalizeError::Identifier(_))));
    }

    #[test]
    fn decompose_keeps_bad_lines_scoped() {
        let envelope = Envelope::new(
            "ABC123",
            "192.168.1.100:54321",
            "12345 temp_noz v=220.5 1637000000\n\nfan_speed rpm=1500i 1637000000",
        );
        let frame = decompose(&envelope, "prusa_").expect("frame");
        assert_eq!(frame.identity, identity());
        assert_eq!(frame.records.len(), 3);
        assert!(frame.records[0].is_err());
        assert_eq!(
            frame.records[1].as_deref().ok(),
            Some("prusa_fan_speed,printer_mac=ABC123,printer_address=192.168.1.100 rpm=1500i 1637000000")
        );
        assert!(
            frame.records[2]
                .as_deref()
                .is_ok_and(|line| line.starts_with("prusa_temp_noz,"))
        );
    }
}
