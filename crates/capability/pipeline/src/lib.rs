//! 采集处理链路：信封 -> 拆帧 -> 解析 -> 写入指标目录。

use async_trait::async_trait;
use domain::Envelope;
use prusa_ingest::{EnvelopeHandler, IngestError};
use prusa_normalize::{NormalizeError, decompose, parse_line};
use prusa_registry::MetricRegistry;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 单个信封的处理结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub records: usize,
    pub parsed: usize,
    pub dropped: usize,
    pub samples: usize,
}

/// 信封处理器：持有指标目录与前缀。
#[derive(Clone)]
pub struct EnvelopeProcessor {
    registry: Arc<MetricRegistry>,
    prefix: String,
}

impl EnvelopeProcessor {
    pub fn new(registry: Arc<MetricRegistry>, prefix: impl Into<String>) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// 处理一个信封。缺少身份时整条丢弃；单行失败只丢该行。
    pub fn process(&self, envelope: &Envelope) -> Result<ProcessReport, NormalizeError> {
        let frame = match decompose(envelope, &self.prefix) {
            Ok(frame) => frame,
            Err(err) => {
                prusa_telemetry::record_identifier_error();
                debug!(
                    target: "prusa.pipeline",
                    source = ?envelope.source_address,
                    error = %err,
                    "envelope_unidentified"
                );
                return Err(err);
            }
        };
        self.registry
            .touch_last_push(&frame.identity.mac, &frame.identity.address);

        let mut report = ProcessReport {
            records: frame.records.len(),
            ..ProcessReport::default()
        };
        for record in frame.records {
            match record.and_then(|line| parse_line(&line)) {
                Ok(point) => {
                    prusa_telemetry::record_record_parsed();
                    report.parsed += 1;
                    report.samples += self.registry.observe(&point);
                }
                Err(err) => {
                    prusa_telemetry::record_record_dropped();
                    report.dropped += 1;
                    debug!(
                        target: "prusa.pipeline",
                        printer_mac = %frame.identity.mac,
                        error = %err,
                        "record_dropped"
                    );
                }
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl EnvelopeHandler for EnvelopeProcessor {
    async fn handle(&self, envelope: Envelope) -> Result<(), IngestError> {
        self.process(&envelope)
            .map(|_| ())
            .map_err(|err| IngestError::Handler(err.to_string()))
    }
}

/// 固定数量的 worker，共享同一个有界队列的接收端。
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 启动 worker。发送端全部释放且队列排空后 worker 自行退出。
    pub fn spawn(
        receiver: mpsc::Receiver<Envelope>,
        handler: Arc<dyn EnvelopeHandler>,
        workers: usize,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let handler = handler.clone();
                tokio::spawn(run_worker(worker, receiver, handler))
            })
            .collect();
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// 等待全部 worker 退出。
    pub async fn join(self) -> Result<(), IngestError> {
        let mut failure = None;
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(target: "prusa.pipeline", error = %err, "worker_join_failed");
                failure.get_or_insert(IngestError::Task(err.to_string()));
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    handler: Arc<dyn EnvelopeHandler>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(envelope) = next else {
            break;
        };
        if let Err(err) = handler.handle(envelope).await {
            debug!(target: "prusa.pipeline", worker, error = %err, "envelope_handler_failed");
        }
    }
    info!(target: "prusa.pipeline", worker, "worker_stopped");
}
