// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic logging for the agent.
//!
//! Every event is written as
//!
//! ```text
//! LOGAGENT | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! to stdout and, when a log directory is configured, to a file rotated daily
//! in that directory.

use std::fmt;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "logagent.log";

/// Event formatter prefixing every line with `LOGAGENT` and the level.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOGAGENT | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the lifetime of the process.
pub fn init(log_level: &str, log_dir: &Path) -> Result<Option<WorkerGuard>, String> {
    // librdkafka's own chatter stays at warn unless explicitly asked for.
    let env_filter = EnvFilter::try_new(format!("rdkafka=warn,{log_level}"))
        .map_err(|e| format!("could not parse log level in configuration: {e}"))?;

    let stdout_layer = tracing_subscriber::fmt::layer().event_format(Formatter);

    let (file_layer, guard) = if log_dir.as_os_str().is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .event_format(Formatter)
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("setting default subscriber failed: {e}"))?;

    Ok(guard)
}
