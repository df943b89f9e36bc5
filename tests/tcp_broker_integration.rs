//! Broker over real TCP connections.

mod common;

use common::*;
use filter_broker::config::BrokerConfig;
use filter_broker::dispatch::{
    Admission, ChannelObserver, Delivery, FilterAvailability, Metadata, RejectionReason,
    ReplyResult,
};
use filter_broker::execution::Broker;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn test_config() -> BrokerConfig {
    BrokerConfig {
        bind_address: "127.0.0.1:0".to_string(), // Use OS-assigned port
        backlog_capacity: 2,
        graceful_shutdown_timeout_ms: 1_000,
        ..BrokerConfig::default()
    }
}

async fn start() -> (
    Broker,
    mpsc::UnboundedReceiver<Delivery>,
    mpsc::UnboundedReceiver<FilterAvailability>,
) {
    let (observer, availability) = ChannelObserver::channel();
    let (broker, deliveries) = Broker::start(test_config(), Box::new(observer))
        .await
        .expect("broker starts");
    (broker, deliveries, availability)
}

async fn next_delivery(deliveries: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    timeout(IO_TIMEOUT, deliveries.recv())
        .await
        .expect("delivery within timeout")
        .expect("delivery queue open")
}

fn meta(request_id: &str) -> Metadata {
    Metadata::new(request_id, "127.0.0.1", 7400)
}

#[tokio::test]
async fn test_hedged_round_trip_over_tcp() {
    let (broker, mut deliveries, mut availability) = start().await;
    let handle = broker.handle();

    let mut a = FakeWorker::connect(broker.local_addr(), "thumbnail").await;
    let mut b = FakeWorker::connect(broker.local_addr(), "thumbnail").await;
    wait_for_workers(&handle, "thumbnail", 2).await;
    assert_eq!(
        availability.recv().await,
        Some(FilterAvailability::Servable("thumbnail".to_string()))
    );

    let admission = handle
        .submit("thumbnail", meta("req-1"), b"raw image".to_vec())
        .await
        .unwrap();
    assert_eq!(admission, Admission::Accepted { racers: 2 });

    let to_a = a.recv_dispatch().await;
    let to_b = b.recv_dispatch().await;
    assert_eq!(to_a, to_b);
    assert_eq!(to_a.request_id, "req-1");
    assert_eq!(to_a.payload, b"raw image".to_vec());

    b.reply("req-1", vec![json!({"thumb": "b64"})]).await;
    let first = next_delivery(&mut deliveries).await;
    assert!(first.complete);
    assert_eq!(first.metadata.return_port, 7400);
    assert_eq!(
        first.result,
        ReplyResult::Answer(vec![json!({"thumb": "b64"})])
    );

    a.reply("req-1", vec![json!({"thumb": "late"})]).await;
    let second = next_delivery(&mut deliveries).await;
    assert!(!second.complete);

    // Any later round trip guarantees the snapshot covers the submission
    handle.stats().await.unwrap();
    let snapshot = handle.stats_snapshot();
    assert_eq!(snapshot.submissions_accepted, 1);
    assert_eq!(snapshot.registered_workers, 2);

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_submit_without_workers_is_rejected() {
    let (broker, _deliveries, _availability) = start().await;

    let admission = broker
        .handle()
        .submit("ocr", meta("req-1"), vec![])
        .await
        .unwrap();
    assert_eq!(
        admission,
        Admission::Rejected(RejectionReason::FilterUnavailable)
    );

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_registration_closes_connection() {
    let (broker, _deliveries, _availability) = start().await;

    let mut worker = FakeWorker::connect_raw(broker.local_addr()).await;
    worker.send_frame(&[0xc3, 0x28]).await;
    worker.expect_closed().await;

    let stats = broker.handle().stats().await.unwrap();
    assert_eq!(stats.registered_workers, 0);
    assert!(stats.filters.is_empty());

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_disconnect_fails_live_request() {
    let (broker, mut deliveries, mut availability) = start().await;
    let handle = broker.handle();

    let mut worker = FakeWorker::connect(broker.local_addr(), "ocr").await;
    wait_for_workers(&handle, "ocr", 1).await;

    handle.submit("ocr", meta("req-1"), vec![1]).await.unwrap();
    let queued = handle.submit("ocr", meta("req-2"), vec![2]).await.unwrap();
    assert_eq!(queued, Admission::Queued { depth: 1 });
    worker.recv_dispatch().await;

    drop(worker);

    let failure = next_delivery(&mut deliveries).await;
    assert_eq!(failure.metadata.request_id, "req-1");
    assert!(failure.complete);
    assert!(matches!(failure.result, ReplyResult::WorkerFailure { .. }));

    let flushed = next_delivery(&mut deliveries).await;
    assert_eq!(flushed.metadata.request_id, "req-2");
    assert!(matches!(
        flushed.result,
        ReplyResult::FilterUnavailable { .. }
    ));

    availability.recv().await;
    assert_eq!(
        availability.recv().await,
        Some(FilterAvailability::Unservable("ocr".to_string()))
    );

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sweep_probes_idle_worker_over_the_wire() {
    let config = BrokerConfig {
        heartbeat_timeout_ms: 1,
        ..test_config()
    };
    let (broker, _deliveries) = Broker::start(config, Box::new(ChannelObserver::channel().0))
        .await
        .unwrap();
    let handle = broker.handle();

    let mut worker = FakeWorker::connect(broker.local_addr(), "resize").await;
    wait_for_workers(&handle, "resize", 1).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let report = handle.sweep_now().await.unwrap();
    assert_eq!(report.probed, 1);
    let probe = worker.recv_frame().await.unwrap();
    assert!(probe.is_empty());

    // Silence through a second deadline drops the worker and closes its socket
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let report = handle.sweep_now().await.unwrap();
    assert_eq!(report.dropped.len(), 1);
    worker.expect_closed().await;

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_worker_connections() {
    let (broker, _deliveries, _availability) = start().await;
    let handle = broker.handle();

    let mut worker = FakeWorker::connect(broker.local_addr(), "resize").await;
    wait_for_workers(&handle, "resize", 1).await;

    broker.shutdown().await.unwrap();

    worker.expect_closed().await;
    assert!(handle.stats().await.is_err());
}
