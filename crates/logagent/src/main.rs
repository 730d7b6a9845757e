// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use anyhow::Context;
use tracing::{debug, error, info};

use logagent_core::{kafka::KafkaConnector, logger, Config, LineSource, Pipeline};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            // No subscriber yet: the configured level is unknown.
            eprintln!("LOGAGENT | ERROR | {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logger::init(&config.log_level, &config.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("LOGAGENT | ERROR | {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Logging subsystem enabled");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let source = LineSource::open(&config.logs.collect_path, config.tail_config())
        .await
        .with_context(|| {
            format!(
                "failed to tail {}",
                config.logs.collect_path.display()
            )
        })?;
    info!("tailing {}", config.logs.collect_path.display());

    let connector = KafkaConnector::new(config.kafka.address.clone(), config.message_timeout());
    let pipeline = Pipeline::new(config.pipeline_config(), source, Box::new(connector));
    pipeline
        .start()
        .await
        .with_context(|| format!("failed to connect to kafka at {}", config.kafka.address))?;

    let signal = wait_for_signal().await.context("failed to listen for signals")?;
    info!("received {signal}, initiating shutdown");

    pipeline.shutdown().await?;
    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
}
