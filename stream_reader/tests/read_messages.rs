mod common;

use common::{messages, FakeBroker, FakeSessionFactory};
use serde_json::json;
use std::time::Duration;
use stream_reader::error::ReaderError;
use stream_reader::queries::read_messages::{
    read_messages, ReadLimit, ReadMessagesQuery, READ_TIMEOUT,
};
use stream_reader::session::{SessionFactory, StreamSession};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

async fn open_session(factory: &FakeSessionFactory) -> Box<dyn StreamSession> {
    factory
        .open(&common::endpoint("local", 15672, "/"), "/")
        .await
        .unwrap()
}

fn query(stream: &str, offset: u64, limit: i64) -> ReadMessagesQuery {
    ReadMessagesQuery {
        stream: stream.to_owned(),
        offset,
        limit: ReadLimit::from_requested(limit),
    }
}

#[tokio::test]
async fn stops_at_the_limit() {
    let factory = FakeSessionFactory::new(FakeBroker::default().with_stream("events", messages(0..20)));
    let session = open_session(&factory).await;

    let batch = read_messages(session.as_ref(), query("events", 7, 3), &CancellationToken::new())
        .await
        .unwrap();

    let offsets = batch.messages.iter().map(|m| m.offset).collect::<Vec<_>>();
    assert_eq!(offsets, vec![7, 8, 9]);
    assert_eq!(batch.start_offset, 7);
    assert_eq!(batch.end_offset, 9);
    assert!(batch.has_more);
    assert_eq!(batch.messages[0].properties["counter"], json!(7));
    assert_eq!(batch.messages[0].data.as_ref(), b"message 7");
    assert_eq!(factory.counters.subscription_closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_returns_partial_batch() {
    let factory = FakeSessionFactory::new(FakeBroker::default().with_stream("events", messages(0..3)));
    let session = open_session(&factory).await;
    let started = Instant::now();

    let batch = read_messages(session.as_ref(), query("events", 0, 10), &CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= READ_TIMEOUT);
    assert_eq!(batch.messages.len(), 3);
    assert_eq!((batch.start_offset, batch.end_offset), (0, 2));
    assert!(!batch.has_more);
    assert_eq!(factory.counters.subscription_closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_stream_gives_empty_batch_at_requested_offset() {
    let factory = FakeSessionFactory::new(FakeBroker::default().with_stream("events", messages(0..5)));
    let session = open_session(&factory).await;

    let batch = read_messages(session.as_ref(), query("events", 100, 10), &CancellationToken::new())
        .await
        .unwrap();

    assert!(batch.messages.is_empty());
    assert_eq!((batch.start_offset, batch.end_offset), (100, 100));
    assert!(!batch.has_more);
}

#[tokio::test(start_paused = true)]
async fn slow_stream_is_cut_off_by_the_timeout() {
    let factory = FakeSessionFactory::new(FakeBroker {
        delivery_interval: Some(Duration::from_secs(1)),
        ..FakeBroker::default().with_stream("events", messages(0..10))
    });
    let session = open_session(&factory).await;

    let batch = read_messages(session.as_ref(), query("events", 0, 100), &CancellationToken::new())
        .await
        .unwrap();

    let count = batch.messages.len();
    assert!((1..10).contains(&count), "collected {count} messages");
    assert_eq!(batch.start_offset, 0);
    assert_eq!(batch.end_offset, count as u64 - 1);
    assert!(!batch.has_more);

    // nothing reaches the handler once the subscription is closed
    sleep(Duration::from_secs(20)).await;
    assert_eq!(factory.counters.subscription_closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_fails_the_read_and_closes_the_subscription() {
    let factory = FakeSessionFactory::new(FakeBroker {
        delivery_interval: Some(Duration::from_secs(1)),
        ..FakeBroker::default().with_stream("events", messages(0..10))
    });
    let session = open_session(&factory).await;
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(2500)).await;
        canceller.cancel();
    });

    let result = read_messages(session.as_ref(), query("events", 0, 100), &token).await;

    assert!(matches!(result, Err(ReaderError::Cancelled)));
    assert_eq!(factory.counters.subscription_closes(), 1);
}

#[tokio::test]
async fn subscribe_failure_is_reported() {
    let factory = FakeSessionFactory::new(FakeBroker::default());
    let session = open_session(&factory).await;

    let error = read_messages(session.as_ref(), query("missing", 0, 10), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(error.to_string().contains("While subscribing to stream 'missing'"));
    assert_eq!(factory.counters.subscription_closes(), 0);
}

#[tokio::test]
async fn trimmed_stream_starts_at_the_first_retained_offset() {
    let factory = FakeSessionFactory::new(FakeBroker::default().with_stream("events", messages(10..30)));
    let session = open_session(&factory).await;

    let batch = read_messages(session.as_ref(), query("events", 0, 3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(batch.messages.len(), 3);
    assert_eq!((batch.start_offset, batch.end_offset), (10, 12));
    assert!(batch.has_more);
}

#[tokio::test(start_paused = true)]
async fn cancelled_read_does_not_wait_for_a_stuck_subscribe() {
    let factory = FakeSessionFactory::new(FakeBroker {
        unresponsive: true,
        ..FakeBroker::default().with_stream("events", messages(0..10))
    });
    let session = open_session(&factory).await;
    let token = CancellationToken::new();
    token.cancel();

    let result = timeout(
        Duration::from_secs(60),
        read_messages(session.as_ref(), query("events", 0, 10), &token),
    )
    .await
    .expect("read should not hang");

    assert!(matches!(result, Err(ReaderError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn stuck_subscribe_is_cut_off_by_the_timeout() {
    let factory = FakeSessionFactory::new(FakeBroker {
        unresponsive: true,
        ..FakeBroker::default().with_stream("events", messages(0..10))
    });
    let session = open_session(&factory).await;
    let started = Instant::now();

    let batch = read_messages(session.as_ref(), query("events", 4, 10), &CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= READ_TIMEOUT);
    assert!(batch.messages.is_empty());
    assert_eq!((batch.start_offset, batch.end_offset), (4, 4));
    assert!(!batch.has_more);
}
