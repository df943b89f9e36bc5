//! A worker process stand-in speaking the framed TCP protocol.

use bytes::Bytes;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};

use filter_broker::dispatch::wire::encode_reply;
use filter_broker::dispatch::{DispatchEnvelope, ReplyEnvelope};
use filter_broker::execution::framing::{read_frame, write_frame};
use filter_broker::BrokerHandle;

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FRAME: u32 = 1024 * 1024;

pub struct FakeWorker {
    stream: TcpStream,
    filter: String,
}

impl FakeWorker {
    pub async fn connect(addr: SocketAddr, filter: &str) -> Self {
        let mut worker = Self::connect_raw(addr).await;
        worker.send_frame(filter.as_bytes()).await;
        worker.filter = filter.to_string();
        worker
    }

    /// Connect without registering
    pub async fn connect_raw(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to broker");
        Self {
            stream,
            filter: String::new(),
        }
    }

    pub async fn send_frame(&mut self, payload: &[u8]) {
        write_frame(&mut self.stream, payload, MAX_FRAME)
            .await
            .expect("write frame");
    }

    /// Next frame from the broker; `None` once the broker closed the connection
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        timeout(IO_TIMEOUT, read_frame(&mut self.stream, MAX_FRAME))
            .await
            .expect("frame within timeout")
            .ok()
            .flatten()
    }

    /// Next dispatch, skipping heartbeat probes
    pub async fn recv_dispatch(&mut self) -> DispatchEnvelope {
        loop {
            let frame = self.recv_frame().await.expect("connection open");
            if frame.is_empty() {
                continue;
            }
            return serde_json::from_slice(&frame).expect("dispatch envelope");
        }
    }

    pub async fn reply(&mut self, request_id: &str, result_set: Vec<Value>) {
        let reply = ReplyEnvelope {
            request_id: request_id.to_string(),
            result_set,
            filter_name: self.filter.clone(),
        };
        let payload = encode_reply(&reply).expect("encode reply");
        self.send_frame(&payload).await;
    }

    pub async fn ack_heartbeat(&mut self) {
        self.send_frame(b"").await;
    }

    pub async fn expect_closed(&mut self) {
        assert!(self.recv_frame().await.is_none(), "expected broker to close the connection");
    }
}

/// Poll broker stats until `filter` has `count` registered workers
pub async fn wait_for_workers(handle: &BrokerHandle, filter: &str, count: usize) {
    let result = timeout(IO_TIMEOUT, async {
        loop {
            let stats = handle.stats().await.expect("broker running");
            let workers = stats
                .filters
                .iter()
                .find(|f| f.name == filter)
                .map_or(0, |f| f.workers);
            if workers == count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "filter '{filter}' never reached {count} workers");
}
