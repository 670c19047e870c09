use std::collections::BTreeMap;

/// 一个 syslog 报文解码后的信封。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// 固件上报的 hostname（由 MAC 派生），缺失时为 None
    pub device_id: Option<String>,
    /// UDP 对端地址（host:port）
    pub source_address: Option<String>,
    /// 报文正文，可能包含多条换行分隔的记录
    pub body: String,
}

impl Envelope {
    pub fn new(
        device_id: impl Into<String>,
        source_address: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            device_id: Some(device_id.into()),
            source_address: Some(source_address.into()),
            body: body.into(),
        }
    }
}

/// 字段值的数据类型。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
}

/// 单条 line protocol 记录解析后的点。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}
