//! 报文规整：拆帧、line protocol 解析与取值转换。

pub mod coerce;
pub mod frame;
pub mod line_protocol;

pub use coerce::{coerce, material_code};
pub use frame::{DeviceIdentity, Frame, decompose, host_part, identify, rotate_lines, tag_line};
pub use line_protocol::{parse_field_value, parse_line, split_segments};

/// 规整化错误。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// 信封缺少设备身份，整条信封丢弃
    #[error("identifier error: {0}")]
    Identifier(String),
    /// 单条记录格式错误，仅丢弃该行
    #[error("format error: {0}")]
    Format(String),
}
