// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single consumer of the message queue.
//!
//! The sender performs one delivery call per message, in queue order. A failed
//! delivery is logged and skipped: there is no retry, no requeue and no
//! backoff, so one bad message or broker hiccup never stalls the lines behind
//! it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::delivery::DeliveryClient;
use crate::queue::{OutboundMessage, QueueReceiver};
use crate::stats::PipelineStats;

pub struct Sender {
    receiver: QueueReceiver,
    client: Box<dyn DeliveryClient>,
    cancel_token: CancellationToken,
    stats: Arc<PipelineStats>,
}

impl Sender {
    #[must_use]
    pub fn new(
        receiver: QueueReceiver,
        client: Box<dyn DeliveryClient>,
        cancel_token: CancellationToken,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            receiver,
            client,
            cancel_token,
            stats,
        }
    }

    /// Drains the queue until it is closed and empty.
    ///
    /// Once cancelled, the sender stops waiting for new intake and only
    /// delivers what is still buffered. The client is handed back when the
    /// loop is over so its owner can release it after the last call.
    pub async fn run(mut self) -> Box<dyn DeliveryClient> {
        debug!("SENDER | started");

        loop {
            tokio::select! {
                message = self.receiver.dequeue() => match message {
                    Some(message) => self.send(message).await,
                    None => {
                        debug!("SENDER | queue closed, terminating");
                        break;
                    }
                },
                () = self.cancel_token.cancelled() => {
                    debug!("SENDER | received shutdown signal, draining remaining messages");
                    while let Some(message) = self.receiver.dequeue().await {
                        self.send(message).await;
                    }
                    debug!("SENDER | finished draining");
                    break;
                }
            }
        }

        debug!("SENDER | stopped");
        self.client
    }

    async fn send(&self, message: OutboundMessage) {
        match self.client.deliver(&message).await {
            Ok(placement) => {
                self.stats.record_delivered();
                debug!(
                    "SENDER | message delivered, partition: {}, offset: {}",
                    placement.partition, placement.offset
                );
            }
            Err(e) => {
                self.stats.record_failed();
                error!("SENDER | failed to deliver message to {}: {e}", message.topic);
            }
        }
    }
}
