//! UDP 监听循环。

use crate::IngestError;
use crate::syslog;
use domain::Envelope;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 单个 UDP 报文的最大长度。
const MAX_DATAGRAM: usize = 65_535;

/// 接收出错后的退避时间。
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// syslog UDP 监听器。
pub struct SyslogListener;

impl SyslogListener {
    /// 绑定地址并启动接收循环。
    ///
    /// 绑定失败直接返回错误，不会启动任何任务。队列满时丢弃新报文，
    /// 接收循环不会因下游变慢而阻塞。
    pub async fn start(
        address: &str,
        capacity: usize,
    ) -> Result<(mpsc::Receiver<Envelope>, ListenerHandle), IngestError> {
        let socket = UdpSocket::bind(address).await.map_err(IngestError::Bind)?;
        let local_addr = socket.local_addr()?;
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(
            target: "prusa.ingest",
            listen_addr = %local_addr,
            capacity,
            "syslog_listener_started"
        );
        let task = tokio::spawn(receive_loop(socket, sender, shutdown_rx));

        Ok((
            receiver,
            ListenerHandle {
                local_addr,
                shutdown,
                task,
            },
        ))
    }
}

/// 监听器句柄。
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// 实际绑定的地址（端口为 0 时由系统分配）。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 通知接收循环退出。
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// 等待接收循环结束；结束后队列发送端被释放。
    pub async fn wait(self) -> Result<(), IngestError> {
        self.task
            .await
            .map_err(|err| IngestError::Task(err.to_string()))
    }
}

async fn receive_loop(
    socket: UdpSocket,
    sender: mpsc::Sender<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            received = recv_datagram(&socket, &mut buffer) => match received {
                Some(received) => received,
                None => continue,
            },
        };
        prusa_telemetry::record_datagram_received();

        let message = match syslog::decode(&buffer[..len]) {
            Ok(message) => message,
            Err(err) => {
                prusa_telemetry::record_decode_failure();
                debug!(
                    target: "prusa.ingest",
                    peer = %peer,
                    error = %err,
                    "syslog_decode_failed"
                );
                continue;
            }
        };

        match sender.try_send(message.into_envelope(peer)) {
            Ok(()) => prusa_telemetry::record_envelope_enqueued(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                prusa_telemetry::record_backpressure();
                debug!(target: "prusa.ingest", peer = %peer, "ingest_queue_full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                info!(target: "prusa.ingest", "ingest_queue_closed");
                break;
            }
        }
    }
    info!(target: "prusa.ingest", "syslog_listener_stopped");
}

/// 接收一个报文；出错时记录日志并退避，返回 None。
async fn recv_datagram(socket: &UdpSocket, buffer: &mut [u8]) -> Option<(usize, SocketAddr)> {
    match socket.recv_from(buffer).await {
        Ok(received) => Some(received),
        Err(err) => {
            warn!(target: "prusa.ingest", error = %err, "syslog_recv_failed");
            tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prusa_telemetry::metrics;

    #[tokio::test]
    async fn delivers_decoded_datagrams() {
        let (mut receiver, handle) = SyslogListener::start("127.0.0.1:0", 8)
            .await
            .expect("listener");
        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
        client
            .send_to(b"<13>ABC123 5 temp_noz v=215.2", handle.local_addr())
            .await
            .expect("send");

        let envelope = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
            .await
            .expect("timeout")
            .expect("envelope");
        assert_eq!(envelope.device_id.as_deref(), Some("ABC123"));
        assert_eq!(envelope.body, "5 temp_noz v=215.2");
        let client_addr = client.local_addr().expect("client addr");
        assert_eq!(envelope.source_address, Some(client_addr.to_string()));

        handle.stop();
        handle.wait().await.expect("wait");
    }

    #[tokio::test]
    async fn skips_undecodable_datagrams() {
        let (mut receiver, handle) = SyslogListener::start("127.0.0.1:0", 8)
            .await
            .expect("listener");
        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
        client
            .send_to(b"not syslog", handle.local_addr())
            .await
            .expect("send");
        client
            .send_to(b"<13>ABC 1 fan rpm=1i", handle.local_addr())
            .await
            .expect("send");

        let envelope = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
            .await
            .expect("timeout")
            .expect("envelope");
        assert_eq!(envelope.body, "1 fan rpm=1i");

        handle.stop();
        handle.wait().await.expect("wait");
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts_backpressure() {
        let before = metrics().snapshot().backpressure;
        let (mut receiver, handle) = SyslogListener::start("127.0.0.1:0", 1)
            .await
            .expect("listener");
        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
        for seq in 1..=3 {
            let datagram = format!("<13>ABC {} fan rpm={}i", seq, seq);
            client
                .send_to(datagram.as_bytes(), handle.local_addr())
                .await
                .expect("send");
        }

        let mut dropped = 0;
        for _ in 0..100 {
            dropped = metrics().snapshot().backpressure - before;
            if dropped >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped >= 2);

        let envelope = receiver.recv().await.expect("envelope");
        assert_eq!(envelope.body, "1 fan rpm=1i");
        assert!(matches!(
            receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));

        handle.stop();
        handle.wait().await.expect("wait");
    }

    #[tokio::test]
    async fn recv_error_backs_off_before_retrying() {
        // 向无人监听的端口发送后，已连接的 socket 会收到 ECONNREFUSED
        let closed = UdpSocket::bind("127.0.0.1:0").await.expect("closed");
        let closed_addr = closed.local_addr().expect("closed addr");
        drop(closed);
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("socket");
        socket.connect(closed_addr).await.expect("connect");
        socket.send(b"<13>ABC 1 fan rpm=1i").await.expect("send");

        let mut buffer = vec![0u8; 64];
        let started = std::time::Instant::now();
        let received = tokio::time::timeout(
            Duration::from_secs(2),
            recv_datagram(&socket, &mut buffer),
        )
        .await
        .expect("timeout");
        assert!(received.is_none());
        assert!(started.elapsed() >= RECV_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn stop_closes_the_queue() {
        let (mut receiver, handle) = SyslogListener::start("127.0.0.1:0", 1)
            .await
            .expect("listener");
        handle.stop();
        handle.wait().await.expect("wait");
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let (_receiver, handle) = SyslogListener::start("127.0.0.1:0", 1)
            .await
            .expect("listener");
        let taken = handle.local_addr().to_string();
        let err = SyslogListener::start(&taken, 1)
            .await
            .err()
            .expect("bind should fail");
        assert!(matches!(err, IngestError::Bind(_)));
        handle.stop();
        handle.wait().await.expect("wait");

        let err = SyslogListener::start("not-an-address", 1)
            .await
            .err()
            .expect("bad address");
        assert!(matches!(err, IngestError::Bind(_)));
    }
}
