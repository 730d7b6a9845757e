// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use crate::queue::OutboundMessage;

/// Errors raised while loading or validating the agent configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by a line source.
///
/// Rotation and truncation are handled by the tailer and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source file does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to read source: {0}")]
    Read(#[from] std::io::Error),

    #[error("Source {0} cannot be reopened")]
    NotReopenable(String),
}

/// Errors returned by a delivery client.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to create delivery client: {0}")]
    Connect(String),

    #[error("Failed to deliver message: {0}")]
    Send(String),

    #[error("Failed to close delivery client: {0}")]
    Close(String),
}

/// Rejected enqueue. The message is handed back so the caller decides what to drop.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("message queue is full")]
    Full(OutboundMessage),

    #[error("message queue is closed")]
    Closed(OutboundMessage),
}

impl EnqueueError {
    pub fn into_message(self) -> OutboundMessage {
        match self {
            EnqueueError::Full(message) | EnqueueError::Closed(message) => message,
        }
    }
}

/// Errors returned by the pipeline lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline already started")]
    AlreadyStarted,

    #[error("Pipeline not running")]
    NotRunning,

    #[error("Failed to start pipeline: {0}")]
    Connect(#[from] DeliveryError),
}
