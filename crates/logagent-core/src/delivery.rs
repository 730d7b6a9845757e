// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::queue::OutboundMessage;

/// Where the broker stored a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub partition: i32,
    pub offset: i64,
}

/// A client publishing one message at a time to the broker.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Publishes `message` and waits for the broker's answer.
    async fn deliver(&self, message: &OutboundMessage) -> Result<Placement, DeliveryError>;

    /// Flushes and releases the underlying connection. Called once, after the
    /// last `deliver`.
    async fn close(&self) -> Result<(), DeliveryError>;
}

/// Builds the delivery client when the pipeline starts.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn DeliveryClient>, DeliveryError>;
}
