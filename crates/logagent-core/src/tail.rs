// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Polling follower for a single, possibly rotated, log file.
//!
//! The tailer runs as its own task and pushes complete lines into a bounded
//! channel. Rotation (the path now points at a different file), truncation and
//! a temporarily missing file are handled here and never reach the consumer.
//! The channel closes when the task gives up, when `follow` is disabled and
//! the end of the file is reached, or when the consumer goes away.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SourceError;

/// Items produced by the tailer: a line, or the error that stopped it.
pub type TailItem = io::Result<String>;

#[derive(Debug, Clone)]
pub struct TailConfig {
    /// Keep waiting for new data at end of file.
    pub follow: bool,
    /// Reopen the path when the file is rotated, truncated or replaced.
    pub reopen: bool,
    /// Refuse to start when the file does not exist yet.
    pub must_exist: bool,
    /// Skip the content present when the file is first opened.
    pub start_at_end: bool,
    pub poll_interval: Duration,
    /// Lines buffered between the tailer and its consumer.
    pub buffer: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            follow: true,
            reopen: true,
            must_exist: false,
            start_at_end: true,
            poll_interval: Duration::from_millis(250),
            buffer: 1024,
        }
    }
}

/// Starts following `path`.
pub async fn spawn_tailer(
    path: PathBuf,
    config: TailConfig,
) -> Result<(mpsc::Receiver<TailItem>, JoinHandle<()>), SourceError> {
    if config.must_exist && tokio::fs::metadata(&path).await.is_err() {
        return Err(SourceError::Missing(path));
    }

    let (tx, rx) = mpsc::channel(config.buffer.max(1));
    let tailer = Tailer {
        path,
        config,
        tx,
        position: 0,
        line_start: 0,
        identity: None,
        partial: Vec::new(),
    };

    Ok((rx, tokio::spawn(tailer.run())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn identity_of(metadata: &std::fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        dev: metadata.dev(),
        ino: metadata.ino(),
    })
}

#[cfg(not(unix))]
fn identity_of(_metadata: &std::fs::Metadata) -> Option<FileIdentity> {
    None
}

/// Where reading starts once the path is (re)opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenAt {
    Start,
    End,
    /// Back at the last unfinished line, if the file is still the same one.
    Resume,
}

/// Offset to continue from after reopening a file that failed mid-read.
///
/// Only the same file, at least as long as before, keeps its offset.
/// Anything else is read from its first byte.
fn resume_position(
    previous: Option<FileIdentity>,
    position: u64,
    current: Option<FileIdentity>,
    len: u64,
) -> u64 {
    if previous == current && len >= position {
        position
    } else {
        0
    }
}

enum EndOfFile {
    Wait,
    Reopen,
    Finished,
}

struct Tailer {
    path: PathBuf,
    config: TailConfig,
    tx: mpsc::Sender<TailItem>,
    position: u64,
    /// Offset of the first byte in `partial`.
    line_start: u64,
    identity: Option<FileIdentity>,
    partial: Vec<u8>,
}

impl Tailer {
    async fn run(mut self) {
        debug!("TAIL | following {}", self.path.display());
        let mut open_at = if self.config.start_at_end {
            OpenAt::End
        } else {
            OpenAt::Start
        };

        'open: loop {
            let file = match self.open(open_at).await {
                Ok(Some(file)) => file,
                Ok(None) => {
                    // Whatever shows up at the path from now on is new content.
                    if open_at == OpenAt::End {
                        open_at = OpenAt::Start;
                    }
                    if !self.wait().await {
                        break 'open;
                    }
                    continue 'open;
                }
                Err(e) => {
                    let _ = self.tx.send(Err(e)).await;
                    break 'open;
                }
            };
            // A replacement file is read from its first byte.
            open_at = OpenAt::Start;

            let mut reader = BufReader::new(file);
            loop {
                match reader.read_until(b'\n', &mut self.partial).await {
                    Ok(0) => match self.at_end_of_file().await {
                        EndOfFile::Wait => {
                            if !self.wait().await {
                                break 'open;
                            }
                        }
                        EndOfFile::Reopen => {
                            debug!("TAIL | {} was rotated, reopening", self.path.display());
                            if !self.flush_partial().await {
                                break 'open;
                            }
                            continue 'open;
                        }
                        EndOfFile::Finished => {
                            self.flush_partial().await;
                            break 'open;
                        }
                    },
                    Ok(n) => {
                        self.position += n as u64;
                        if self.partial.ends_with(b"\n") && !self.flush_partial().await {
                            break 'open;
                        }
                    }
                    Err(e) if self.config.reopen => {
                        warn!("TAIL | read error on {}: {e}, reopening", self.path.display());
                        // The unfinished line is read again from its start.
                        self.partial.clear();
                        self.position = self.line_start;
                        open_at = OpenAt::Resume;
                        if !self.wait().await {
                            break 'open;
                        }
                        continue 'open;
                    }
                    Err(e) => {
                        let _ = self.tx.send(Err(e)).await;
                        break 'open;
                    }
                }
            }
        }

        debug!("TAIL | stopped following {}", self.path.display());
    }

    /// Opens the path. `Ok(None)` means "not there yet, try again later".
    async fn open(&mut self, open_at: OpenAt) -> io::Result<Option<File>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if self.config.reopen => {
                warn!("TAIL | failed to open {}: {e}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let metadata = file.metadata().await?;
        let identity = identity_of(&metadata);
        self.position = match open_at {
            OpenAt::Start => 0,
            OpenAt::End => file.seek(SeekFrom::End(0)).await?,
            OpenAt::Resume => {
                let offset =
                    resume_position(self.identity, self.position, identity, metadata.len());
                file.seek(SeekFrom::Start(offset)).await?
            }
        };
        self.identity = identity;
        self.line_start = self.position;
        Ok(Some(file))
    }

    async fn at_end_of_file(&self) -> EndOfFile {
        if !self.config.follow {
            return EndOfFile::Finished;
        }
        if !self.config.reopen {
            return EndOfFile::Wait;
        }

        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => {
                let replaced = match (self.identity, identity_of(&metadata)) {
                    (Some(current), Some(on_disk)) => current != on_disk,
                    _ => false,
                };
                if replaced || metadata.len() < self.position {
                    EndOfFile::Reopen
                } else {
                    EndOfFile::Wait
                }
            }
            // Moved away and not recreated yet.
            Err(_) => EndOfFile::Reopen,
        }
    }

    /// Sends the buffered line, if any. Returns `false` once nobody listens.
    async fn flush_partial(&mut self) -> bool {
        if self.partial.is_empty() {
            return true;
        }
        let line = decode_line(&self.partial);
        self.partial.clear();
        self.line_start = self.position;
        self.tx.send(Ok(line)).await.is_ok()
    }

    /// Sleeps one poll interval. Returns `false` once nobody listens.
    async fn wait(&self) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.config.poll_interval) => !self.tx.is_closed(),
            () = self.tx.closed() => false,
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// File name used to identify a tailed path in diagnostics.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
