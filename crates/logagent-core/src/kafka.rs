// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Kafka delivery client backed by `rdkafka`'s `FutureProducer`.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::debug;

use crate::delivery::{Connector, DeliveryClient, Placement};
use crate::error::DeliveryError;
use crate::queue::OutboundMessage;

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct KafkaConnector {
    /// Comma separated `host:port` list.
    pub brokers: String,
    /// Upper bound for a single delivery, including librdkafka's own retries.
    pub message_timeout: Duration,
}

impl KafkaConnector {
    pub fn new(brokers: impl Into<String>, message_timeout: Duration) -> Self {
        Self {
            brokers: brokers.into(),
            message_timeout,
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            )
            // Every delivery waits for the full in-sync replica set, like a
            // synchronous producer returning successes.
            .set("acks", "all");
        config
    }
}

impl Connector for KafkaConnector {
    fn connect(&self) -> Result<Box<dyn DeliveryClient>, DeliveryError> {
        let producer: FutureProducer = self
            .client_config()
            .create()
            .map_err(|e| DeliveryError::Connect(e.to_string()))?;

        debug!("KAFKA | producer created for brokers {}", self.brokers);

        Ok(Box::new(KafkaClient {
            producer,
            message_timeout: self.message_timeout,
        }))
    }
}

pub struct KafkaClient {
    producer: FutureProducer,
    message_timeout: Duration,
}

#[async_trait]
impl DeliveryClient for KafkaClient {
    async fn deliver(&self, message: &OutboundMessage) -> Result<Placement, DeliveryError> {
        let record = FutureRecord::<(), str>::to(&message.topic).payload(message.payload.as_str());

        match self.producer.send(record, self.message_timeout).await {
            Ok((partition, offset)) => Ok(Placement { partition, offset }),
            Err((e, _)) => Err(DeliveryError::Send(e.to_string())),
        }
    }

    async fn close(&self) -> Result<(), DeliveryError> {
        // `flush` blocks the calling thread until librdkafka drains its queue.
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(CLOSE_FLUSH_TIMEOUT))
            .await
            .map_err(|e| DeliveryError::Close(format!("flush task failed: {e}")))?
            .map_err(|e| DeliveryError::Close(e.to_string()))
    }
}
