// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingestion-to-delivery pipeline.
//!
//! ```text
//!   LineSource ──> read loop ──> MessageQueue ──> Sender ──> DeliveryClient
//!                     ^              (bounded,       ^
//!                     │            drop on full)     │
//!                     └──── CancellationToken ───────┘
//! ```
//!
//! # Lifecycle
//!
//! `Created → Running → ShuttingDown → Stopped`. Start launches the sender
//! before the read loop so the queue always has a consumer. Shutdown is
//! strictly ordered:
//!
//! 1. cancel, so the read loop stops enqueueing
//! 2. close the queue, so the sender can reach the end of its drain
//! 3. wait for the sender to hand the client back
//! 4. close the client
//!
//! The client is therefore released exactly once, after its last delivery.
//! The sequence runs on its own task and reaches `Stopped` even when the
//! caller stops waiting for it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::{Connector, DeliveryClient};
use crate::error::{PipelineError, SourceError};
use crate::queue::{MessageQueue, OutboundMessage, QueueReceiver};
use crate::sender::Sender;
use crate::source::{LineSource, SourceEvent};
use crate::stats::{PipelineStats, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Destination topic for every line.
    pub topic: String,
    pub queue_capacity: usize,
    /// Pause before reopening a source whose stream closed.
    pub reopen_backoff: Duration,
}

struct Inner {
    state: PipelineState,
    source: Option<LineSource>,
    receiver: Option<QueueReceiver>,
    sender_task: Option<JoinHandle<Box<dyn DeliveryClient>>>,
    reader_task: Option<JoinHandle<()>>,
}

pub struct Pipeline {
    config: PipelineConfig,
    connector: Box<dyn Connector>,
    queue: Arc<MessageQueue>,
    cancel_token: CancellationToken,
    stats: Arc<PipelineStats>,
    inner: Arc<TokioMutex<Inner>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig, source: LineSource, connector: Box<dyn Connector>) -> Self {
        let (queue, receiver) = MessageQueue::new(config.queue_capacity);

        Self {
            config,
            connector,
            queue: Arc::new(queue),
            cancel_token: CancellationToken::new(),
            stats: Arc::new(PipelineStats::default()),
            inner: Arc::new(TokioMutex::new(Inner {
                state: PipelineState::Created,
                source: Some(source),
                receiver: Some(receiver),
                sender_task: None,
                reader_task: None,
            })),
        }
    }

    pub async fn state(&self) -> PipelineState {
        self.inner.lock().await.state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Connects the delivery client, then spawns the sender and the read loop.
    ///
    /// On a connection failure the pipeline stays `Created`.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().await;
        if inner.state != PipelineState::Created {
            return Err(PipelineError::AlreadyStarted);
        }

        let client = self.connector.connect().map_err(|e| {
            error!("PIPELINE | failed to create delivery client: {e}");
            PipelineError::from(e)
        })?;

        let (Some(receiver), Some(source)) = (inner.receiver.take(), inner.source.take()) else {
            return Err(PipelineError::AlreadyStarted);
        };

        let sender = Sender::new(
            receiver,
            client,
            self.cancel_token.clone(),
            Arc::clone(&self.stats),
        );
        inner.sender_task = Some(tokio::spawn(sender.run()));

        let reader = ReadLoop {
            source,
            queue: Arc::clone(&self.queue),
            topic: self.config.topic.clone(),
            reopen_backoff: self.config.reopen_backoff,
            cancel_token: self.cancel_token.clone(),
            stats: Arc::clone(&self.stats),
        };
        inner.reader_task = Some(tokio::spawn(reader.run()));

        inner.state = PipelineState::Running;
        info!("PIPELINE | started, shipping to topic {}", self.config.topic);
        Ok(())
    }

    /// Stops intake, drains the queue and releases the delivery client.
    ///
    /// Dropping the returned future does not interrupt the sequence. Calling
    /// it again while shutting down or after stopping does nothing.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let (sender_task, reader_task) = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                PipelineState::Created => return Err(PipelineError::NotRunning),
                PipelineState::ShuttingDown | PipelineState::Stopped => return Ok(()),
                PipelineState::Running => {}
            }
            inner.state = PipelineState::ShuttingDown;
            (inner.sender_task.take(), inner.reader_task.take())
        };

        info!("PIPELINE | initiating shutdown");

        let sequence = tokio::spawn(shutdown_sequence(
            Arc::clone(&self.queue),
            self.cancel_token.clone(),
            Arc::clone(&self.inner),
            sender_task,
            reader_task,
        ));
        if let Err(e) = sequence.await {
            error!("PIPELINE | shutdown task failed: {e}");
        }
        Ok(())
    }
}

async fn shutdown_sequence(
    queue: Arc<MessageQueue>,
    cancel_token: CancellationToken,
    inner: Arc<TokioMutex<Inner>>,
    sender_task: Option<JoinHandle<Box<dyn DeliveryClient>>>,
    reader_task: Option<JoinHandle<()>>,
) {
    cancel_token.cancel();
    debug!("PIPELINE | cancellation signalled");

    if !queue.is_empty() {
        debug!("PIPELINE | {} messages left to drain", queue.len());
    }
    queue.close();
    debug!("PIPELINE | queue closed");

    if let Some(sender_task) = sender_task {
        match sender_task.await {
            Ok(client) => {
                debug!("PIPELINE | sender finished");
                match client.close().await {
                    Ok(()) => info!("PIPELINE | delivery client closed"),
                    Err(e) => error!("PIPELINE | error closing delivery client: {e}"),
                }
            }
            Err(e) => error!("PIPELINE | sender task failed: {e}"),
        }
    }

    if let Some(reader_task) = reader_task {
        if let Err(e) = reader_task.await {
            error!("PIPELINE | read loop task failed: {e}");
        }
    }

    inner.lock().await.state = PipelineState::Stopped;
    info!("PIPELINE | shutdown complete");
}

struct ReadLoop {
    source: LineSource,
    queue: Arc<MessageQueue>,
    topic: String,
    reopen_backoff: Duration,
    cancel_token: CancellationToken,
    stats: Arc<PipelineStats>,
}

impl ReadLoop {
    async fn run(mut self) {
        debug!("READER | started on {}", self.source.name());

        while !self.cancel_token.is_cancelled() {
            let event = tokio::select! {
                () = self.cancel_token.cancelled() => break,
                event = self.source.next() => event,
            };

            match event {
                Ok(SourceEvent::Line(record)) => {
                    let message = OutboundMessage::new(self.topic.as_str(), record.into_text());
                    match self.queue.enqueue(message) {
                        Ok(()) => self.stats.record_enqueued(),
                        Err(e) => {
                            self.stats.record_dropped();
                            warn!("READER | {e}, dropping line");
                            debug!("READER | dropped: {}", e.into_message().payload);
                        }
                    }
                }
                Ok(SourceEvent::Closed { source }) => {
                    warn!("READER | source {source} closed, reopening in {:?}", self.reopen_backoff);
                    tokio::select! {
                        () = self.cancel_token.cancelled() => break,
                        () = tokio::time::sleep(self.reopen_backoff) => {}
                    }
                    match self.source.reopen().await {
                        Ok(()) => info!("READER | source {source} reopened"),
                        Err(SourceError::NotReopenable(_)) => {
                            warn!("READER | source {source} closed for good, stopping intake");
                            break;
                        }
                        Err(e) => error!("READER | failed to reopen {source}: {e}"),
                    }
                }
                Err(e) => {
                    error!("READER | {e}, stopping intake");
                    break;
                }
            }
        }

        debug!("READER | stopped");
    }
}
