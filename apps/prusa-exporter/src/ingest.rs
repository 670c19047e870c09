//! 采集链路装配：UDP 监听 -> 有界队列 -> worker -> 指标目录。

use prusa_config::AppConfig;
use prusa_ingest::{EnvelopeHandler, IngestError, ListenerHandle, SyslogListener};
use prusa_pipeline::{EnvelopeProcessor, WorkerPool};
use prusa_registry::MetricRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// 运行中的采集链路。
pub struct IngestRuntime {
    listener: ListenerHandle,
    pool: WorkerPool,
}

impl IngestRuntime {
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// 停止接收，等待 worker 排空队列后退出。
    pub async fn shutdown(self) -> Result<(), IngestError> {
        self.listener.stop();
        self.listener.wait().await?;
        self.pool.join().await
    }
}

/// 启动采集链路；监听地址绑定失败时直接返回错误。
pub async fn spawn_ingest(
    config: &AppConfig,
    registry: Arc<MetricRegistry>,
) -> Result<IngestRuntime, IngestError> {
    let (receiver, listener) =
        SyslogListener::start(&config.syslog_addr, config.ingest_queue_capacity).await?;

    let handler: Arc<dyn EnvelopeHandler> =
        Arc::new(EnvelopeProcessor::new(registry, config.metric_prefix.clone()));
    let pool = WorkerPool::spawn(receiver, handler, config.ingest_workers);
    info!(
        target: "prusa.ingest",
        syslog_addr = %listener.local_addr(),
        workers = pool.len(),
        queue = config.ingest_queue_capacity,
        "ingest_started"
    );

    Ok(IngestRuntime { listener, pool })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    fn test_config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "PRUSA_SYSLOG_ADDR" => Some("127.0.0.1:0".to_string()),
            "PRUSA_INGEST_WORKERS" => Some("2".to_string()),
            _ => None,
        })
        .expect("config")
    }

    #[tokio::test]
    async fn datagram_reaches_registry() {
        let config = test_config();
        let registry = Arc::new(MetricRegistry::new(&config.metric_prefix).expect("registry"));
        let runtime = spawn_ingest(&config, registry.clone())
            .await
            .expect("ingest");

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
        client
            .send_to(
                b"<14>1 - 10A1B2C3D4E5 buddy - - - 7 temp_noz v=215.5 1\nfan rpm=1500i",
                runtime.local_addr(),
            )
            .await
            .expect("send");

        let mut found = None;
        for _ in 0..50 {
            if let Some(family) = registry.family("prusa_fan_rpm") {
                found = family.get(&["127.0.0.1", "10A1B2C3D4E5"]);
                if found.is_some() && registry.family("prusa_temp_noz").is_some() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(found, Some(1500.0));
        let nozzle = registry.family("prusa_temp_noz").expect("nozzle");
        assert_eq!(nozzle.get(&["127.0.0.1", "10A1B2C3D4E5"]), Some(215.5));

        runtime.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let config = test_config();
        let registry = Arc::new(MetricRegistry::new("prusa_").expect("registry"));
        let running = spawn_ingest(&config, registry.clone())
            .await
            .expect("ingest");

        let mut taken = config.clone();
        taken.syslog_addr = running.local_addr().to_string();
        let err = spawn_ingest(&taken, registry)
            .await
            .err()
            .expect("bind should fail");
        assert!(matches!(err, IngestError::Bind(_)));

        running.shutdown().await.expect("shutdown");
    }
}
