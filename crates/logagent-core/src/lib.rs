// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log shipping agent core.
//!
//! Tails a growing log file and forwards every non-blank line, in order, to a
//! single broker topic through a bounded, drop-on-full queue and a single
//! sender loop.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod delivery;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod logger;
pub mod pipeline;
pub mod queue;
pub mod sender;
pub mod source;
pub mod stats;
pub mod tail;

pub use config::Config;
pub use delivery::{Connector, DeliveryClient, Placement};
pub use error::{ConfigError, DeliveryError, EnqueueError, PipelineError, SourceError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineState};
pub use queue::{MessageQueue, OutboundMessage, QueueReceiver};
pub use source::{LineRecord, LineSource, SourceEvent};
pub use stats::StatsSnapshot;
