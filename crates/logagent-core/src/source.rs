// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line source feeding the pipeline.
//!
//! Wraps either a file tailer or any in-process channel of lines, hides blank
//! lines from the caller and reports the end of the underlying stream as a
//! distinct [`SourceEvent::Closed`] event.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::tail::{display_name, spawn_tailer, TailConfig, TailItem};

/// One non-blank line read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    text: String,
}

impl LineRecord {
    pub fn into_text(self) -> String {
        self.text
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SourceEvent {
    Line(LineRecord),
    /// The underlying stream ended. Carries the source name for diagnostics.
    Closed { source: String },
}

enum Origin {
    File {
        path: PathBuf,
        config: TailConfig,
        task: JoinHandle<()>,
    },
    Channel,
}

pub struct LineSource {
    name: String,
    lines: mpsc::Receiver<TailItem>,
    origin: Origin,
}

impl LineSource {
    /// Starts tailing `path`.
    pub async fn open(path: impl Into<PathBuf>, config: TailConfig) -> Result<Self, SourceError> {
        let path = path.into();
        let (lines, task) = spawn_tailer(path.clone(), config.clone()).await?;

        Ok(Self {
            name: display_name(&path),
            lines,
            origin: Origin::File { path, config, task },
        })
    }

    /// Reads lines pushed into `lines` by the caller. Such a source cannot be
    /// reopened once its sender side is dropped.
    pub fn from_channel(name: impl Into<String>, lines: mpsc::Receiver<TailItem>) -> Self {
        Self {
            name: name.into(),
            lines,
            origin: Origin::Channel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next non-blank line, the end of the stream or a fatal
    /// read error.
    pub async fn next(&mut self) -> Result<SourceEvent, SourceError> {
        loop {
            match self.lines.recv().await {
                Some(Ok(text)) if text.trim().is_empty() => continue,
                Some(Ok(text)) => return Ok(SourceEvent::Line(LineRecord { text })),
                Some(Err(e)) => return Err(SourceError::Read(e)),
                None => {
                    warn!("SOURCE | stream closed, source: {}", self.name);
                    return Ok(SourceEvent::Closed {
                        source: self.name.clone(),
                    });
                }
            }
        }
    }

    /// Restarts the underlying tailer after its stream closed.
    ///
    /// A file read without `follow` is finished once its end was reached and
    /// is never read again.
    pub async fn reopen(&mut self) -> Result<(), SourceError> {
        let Origin::File { path, config, task } = &mut self.origin else {
            return Err(SourceError::NotReopenable(self.name.clone()));
        };
        if !config.follow {
            return Err(SourceError::NotReopenable(self.name.clone()));
        }

        task.abort();
        let (lines, new_task) = spawn_tailer(path.clone(), config.clone()).await?;
        self.lines = lines;
        *task = new_task;

        debug!("SOURCE | reopened {}", self.name);
        Ok(())
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        if let Origin::File { task, .. } = &self.origin {
            task.abort();
        }
    }
}
