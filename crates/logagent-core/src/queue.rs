// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded hand-off between the read loop and the sender loop.
//!
//! The producer side ([`MessageQueue`]) never waits: a full queue rejects the
//! message immediately so log collection keeps running under overload. The
//! consumer side ([`QueueReceiver`]) waits for the next message and sees the
//! end of the stream only once the queue is closed and every buffered message
//! has been handed out.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::EnqueueError;

/// Capacity used when the configured capacity is zero.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// A line on its way to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Producer half of the queue.
#[derive(Debug)]
pub struct MessageQueue {
    capacity: usize,
    // Taken on close, which drops the only sender and lets the receiver drain to the end.
    tx: Mutex<Option<mpsc::Sender<OutboundMessage>>>,
}

/// Consumer half of the queue. Exactly one exists per queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<OutboundMessage>,
}

impl MessageQueue {
    /// Creates a queue holding at most `capacity` messages.
    ///
    /// A capacity of zero falls back to [`DEFAULT_QUEUE_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> (Self, QueueReceiver) {
        let capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        let (tx, rx) = mpsc::channel(capacity);

        let queue = Self {
            capacity,
            tx: Mutex::new(Some(tx)),
        };

        (queue, QueueReceiver { rx })
    }

    /// Appends a message without waiting.
    ///
    /// Returns [`EnqueueError::Full`] when `capacity` messages are already
    /// pending and [`EnqueueError::Closed`] once [`MessageQueue::close`] ran.
    pub fn enqueue(&self, message: OutboundMessage) -> Result<(), EnqueueError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(EnqueueError::Closed(message));
        };

        tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(message) => EnqueueError::Full(message),
            TrySendError::Closed(message) => EnqueueError::Closed(message),
        })
    }

    /// Stops accepting messages. Already buffered messages stay available to
    /// the receiver.
    ///
    /// Returns `true` only for the call that actually closed the queue.
    pub fn close(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Number of messages waiting for the sender. Zero once closed.
    pub fn len(&self) -> usize {
        match self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl QueueReceiver {
    /// Waits for the next message.
    ///
    /// Returns `None` when the queue is closed and nothing is left to hand out.
    pub async fn dequeue(&mut self) -> Option<OutboundMessage> {
        self.rx.recv().await
    }
}
