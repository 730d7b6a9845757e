// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the pipeline integration tests

use logagent_core::{LineSource, PipelineConfig};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub fn pipeline_config(queue_capacity: usize) -> PipelineConfig {
    PipelineConfig {
        topic: "web_log".to_string(),
        queue_capacity,
        reopen_backoff: Duration::from_millis(10),
    }
}

/// Channel-backed source; the returned sender feeds it lines
pub fn channel_source(buffer: usize) -> (mpsc::Sender<io::Result<String>>, LineSource) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, LineSource::from_channel("test.log", rx))
}

pub async fn feed(tx: &mpsc::Sender<io::Result<String>>, lines: &[&str]) {
    for line in lines {
        tx.send(Ok(line.to_string())).await.unwrap();
    }
}

/// Polls `condition` until it holds, panicking after a generous timeout
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("condition not met in time");
}
