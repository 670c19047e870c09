//! syslog UDP 采集：解码报文并投递到有界队列。

use async_trait::async_trait;
use domain::Envelope;

pub mod listener;
pub mod syslog;

pub use listener::{ListenerHandle, SyslogListener};
pub use syslog::{SyslogFormat, SyslogMessage, decode};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("bind error: {0}")]
    Bind(std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("task error: {0}")]
    Task(String),
}

/// 信封处理器。
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Result<(), IngestError>;
}
