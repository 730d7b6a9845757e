// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::helpers::{channel_source, feed, pipeline_config, wait_until};
use common::mocks::MockConnector;
use logagent_core::tail::TailConfig;
use logagent_core::{LineSource, Pipeline, PipelineError, PipelineState};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[tokio::test]
async fn test_lines_delivered_in_read_order() {
    let connector = MockConnector {
        delay: Duration::from_millis(1),
        ..MockConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(64);
    let pipeline = Pipeline::new(pipeline_config(64), source, Box::new(connector));
    pipeline.start().await.unwrap();

    let lines: Vec<String> = (0..50).map(|i| format!("GET /item/{i} 200")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    feed(&tx, &refs).await;

    wait_until(|| log.attempt_count() == 50).await;
    pipeline.shutdown().await.unwrap();

    assert_eq!(log.attempts(), lines);
    assert_eq!(pipeline.stats().delivered, 50);
}

#[tokio::test]
async fn test_blank_lines_never_reach_the_broker() {
    let connector = MockConnector::default();
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(8);
    let pipeline = Pipeline::new(pipeline_config(8), source, Box::new(connector));
    pipeline.start().await.unwrap();

    feed(&tx, &["", "  ", "a", "\t", "b"]).await;

    wait_until(|| log.attempt_count() == 2).await;
    pipeline.shutdown().await.unwrap();

    assert_eq!(log.attempts(), vec!["a", "b"]);
    assert_eq!(pipeline.stats().enqueued, 2);
}

#[tokio::test]
async fn test_full_queue_drops_instead_of_blocking_the_reader() {
    let gate = Arc::new(Semaphore::new(0));
    let connector = MockConnector {
        gate: Some(Arc::clone(&gate)),
        ..MockConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(16);
    let pipeline = Pipeline::new(pipeline_config(2), source, Box::new(connector));
    pipeline.start().await.unwrap();

    let lines: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    feed(&tx, &refs).await;

    // The sender is stuck on its first delivery, yet every line gets read.
    wait_until(|| {
        let stats = pipeline.stats();
        stats.enqueued + stats.dropped == 10
    })
    .await;

    let stats = pipeline.stats();
    // Two queued plus at most one already taken by the stuck sender.
    assert!(stats.enqueued <= 3, "enqueued {}", stats.enqueued);
    assert!(stats.dropped >= 7, "dropped {}", stats.dropped);

    gate.add_permits(100);
    pipeline.shutdown().await.unwrap();

    let attempts = log.attempts();
    assert_eq!(attempts.len() as u64, stats.enqueued);
    // Whatever survived is still in read order.
    let mut sorted = attempts.clone();
    sorted.sort_by_key(|line| line[5..].parse::<u32>().unwrap());
    assert_eq!(attempts, sorted);
}

#[tokio::test]
async fn test_shutdown_drains_pending_messages_before_release() {
    let connector = MockConnector {
        delay: Duration::from_millis(20),
        ..MockConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(8);
    let pipeline = Pipeline::new(pipeline_config(8), source, Box::new(connector));
    pipeline.start().await.unwrap();

    feed(&tx, &["one", "two", "three", "four", "five"]).await;
    wait_until(|| pipeline.stats().enqueued == 5).await;

    pipeline.shutdown().await.unwrap();

    assert_eq!(log.attempts(), vec!["one", "two", "three", "four", "five"]);
    assert_eq!(log.closes(), 1);
    assert_eq!(log.calls_after_close(), 0);
    assert_eq!(pipeline.state().await, PipelineState::Stopped);
}

#[tokio::test]
async fn test_sequential_shutdown_is_idempotent() {
    let connector = MockConnector::default();
    let log = Arc::clone(&connector.log);
    let (_tx, source) = channel_source(1);
    let pipeline = Pipeline::new(pipeline_config(4), source, Box::new(connector));
    pipeline.start().await.unwrap();

    pipeline.shutdown().await.unwrap();
    pipeline.shutdown().await.unwrap();

    assert_eq!(log.closes(), 1);
    assert_eq!(pipeline.state().await, PipelineState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_shutdown_releases_client_once() {
    let connector = MockConnector {
        delay: Duration::from_millis(10),
        ..MockConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(4);
    let pipeline = Pipeline::new(pipeline_config(4), source, Box::new(connector));
    pipeline.start().await.unwrap();

    feed(&tx, &["a", "b", "c"]).await;
    wait_until(|| pipeline.stats().enqueued == 3).await;

    let (first, second) = tokio::join!(pipeline.shutdown(), pipeline.shutdown());
    assert!(first.is_ok());
    assert!(second.is_ok());

    // The second call may return while the first is still draining.
    wait_until(|| log.closes() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.closes(), 1);
    assert_eq!(log.attempts(), vec!["a", "b", "c"]);
    assert_eq!(pipeline.state().await, PipelineState::Stopped);
}

#[tokio::test]
async fn test_delivery_failure_does_not_stop_the_pipeline() {
    let connector = MockConnector {
        failing_payloads: vec!["bad request".to_string()],
        ..MockConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(8);
    let pipeline = Pipeline::new(pipeline_config(8), source, Box::new(connector));
    pipeline.start().await.unwrap();

    feed(&tx, &["first", "bad request", "after failure"]).await;
    wait_until(|| log.attempt_count() == 3).await;

    assert_eq!(pipeline.state().await, PipelineState::Running);
    let stats = pipeline.stats();
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.failed, 1);

    feed(&tx, &["still shipping"]).await;
    wait_until(|| log.attempt_count() == 4).await;

    pipeline.shutdown().await.unwrap();
    assert_eq!(
        log.attempts(),
        vec!["first", "bad request", "after failure", "still shipping"]
    );
}

#[tokio::test]
async fn test_start_failure_keeps_pipeline_created() {
    let connector = MockConnector {
        fail_connect: true,
        ..MockConnector::default()
    };
    let (_tx, source) = channel_source(1);
    let pipeline = Pipeline::new(pipeline_config(4), source, Box::new(connector));

    let result = pipeline.start().await;
    assert!(matches!(result, Err(PipelineError::Connect(_))));
    assert_eq!(pipeline.state().await, PipelineState::Created);

    assert!(matches!(
        pipeline.shutdown().await,
        Err(PipelineError::NotRunning)
    ));
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let (_tx, source) = channel_source(1);
    let pipeline = Pipeline::new(
        pipeline_config(4),
        source,
        Box::new(MockConnector::default()),
    );

    pipeline.start().await.unwrap();
    assert!(matches!(
        pipeline.start().await,
        Err(PipelineError::AlreadyStarted)
    ));
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_permanently_closed_source_keeps_sender_draining() {
    let connector = MockConnector {
        delay: Duration::from_millis(5),
        ..MockConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(8);
    let pipeline = Pipeline::new(pipeline_config(8), source, Box::new(connector));
    pipeline.start().await.unwrap();

    feed(&tx, &["last", "words"]).await;
    drop(tx);

    wait_until(|| log.attempt_count() == 2).await;
    assert_eq!(pipeline.state().await, PipelineState::Running);

    pipeline.shutdown().await.unwrap();
    assert_eq!(log.attempts(), vec!["last", "words"]);
    assert_eq!(log.closes(), 1);
}

#[tokio::test]
async fn test_file_lines_are_shipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "already there\n").unwrap();

    let tail_config = TailConfig {
        poll_interval: Duration::from_millis(10),
        ..TailConfig::default()
    };
    let source = LineSource::open(&path, tail_config).await.unwrap();
    let connector = MockConnector::default();
    let log = Arc::clone(&connector.log);
    let pipeline = Pipeline::new(pipeline_config(16), source, Box::new(connector));
    pipeline.start().await.unwrap();

    // Let the tailer seek past the existing content.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap();
    file.write_all(b"GET / 200\n\nPOST /login 302\n").unwrap();
    file.flush().unwrap();

    wait_until(|| log.attempt_count() == 2).await;
    pipeline.shutdown().await.unwrap();

    assert_eq!(log.attempts(), vec!["GET / 200", "POST /login 302"]);
}

#[tokio::test]
async fn test_file_without_follow_is_shipped_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.log");
    std::fs::write(&path, "a\nb\n").unwrap();

    let tail_config = TailConfig {
        follow: false,
        start_at_end: false,
        poll_interval: Duration::from_millis(10),
        ..TailConfig::default()
    };
    let source = LineSource::open(&path, tail_config).await.unwrap();
    let connector = MockConnector::default();
    let log = Arc::clone(&connector.log);
    let pipeline = Pipeline::new(pipeline_config(16), source, Box::new(connector));
    pipeline.start().await.unwrap();

    // Many reopen backoffs elapse in this window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    pipeline.shutdown().await.unwrap();

    assert_eq!(log.attempts(), vec!["a", "b"]);
    assert_eq!(pipeline.stats().enqueued, 2);
}

#[tokio::test]
async fn test_abandoned_shutdown_still_completes() {
    let gate = Arc::new(Semaphore::new(0));
    let connector = MockConnector {
        gate: Some(Arc::clone(&gate)),
        ..MockConnector::default()
    };
    let log = Arc::clone(&connector.log);
    let (tx, source) = channel_source(4);
    let pipeline = Pipeline::new(pipeline_config(4), source, Box::new(connector));
    pipeline.start().await.unwrap();

    feed(&tx, &["pending"]).await;
    wait_until(|| pipeline.stats().enqueued == 1).await;

    // The sender is stuck on its delivery, so the caller gives up waiting.
    let abandoned = tokio::time::timeout(Duration::from_millis(20), pipeline.shutdown()).await;
    assert!(abandoned.is_err());
    assert_eq!(pipeline.state().await, PipelineState::ShuttingDown);

    gate.add_permits(10);
    wait_until(|| log.closes() == 1).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.state().await != PipelineState::Stopped {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    pipeline.shutdown().await.unwrap();
    assert_eq!(log.attempts(), vec!["pending"]);
    assert_eq!(log.closes(), 1);
    assert_eq!(log.calls_after_close(), 0);
}
