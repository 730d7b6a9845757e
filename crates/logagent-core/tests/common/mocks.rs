// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock delivery client recording every call for assertions

use async_trait::async_trait;
use logagent_core::{Connector, DeliveryClient, DeliveryError, OutboundMessage, Placement};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Everything the mock client observed, shared with the test
#[derive(Default)]
pub struct DeliveryLog {
    attempts: Mutex<Vec<String>>,
    closes: AtomicUsize,
    calls_after_close: AtomicUsize,
}

impl DeliveryLog {
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls_after_close(&self) -> usize {
        self.calls_after_close.load(Ordering::SeqCst)
    }
}

/// Connector handing out [`MockClient`]s
#[derive(Default)]
pub struct MockConnector {
    pub log: Arc<DeliveryLog>,
    /// Time spent in every delivery call
    pub delay: Duration,
    /// Payloads for which delivery fails
    pub failing_payloads: Vec<String>,
    /// When set, every delivery waits for a permit first
    pub gate: Option<Arc<Semaphore>>,
    pub fail_connect: bool,
}

impl Connector for MockConnector {
    fn connect(&self) -> Result<Box<dyn DeliveryClient>, DeliveryError> {
        if self.fail_connect {
            return Err(DeliveryError::Connect("no brokers available".to_string()));
        }
        Ok(Box::new(MockClient {
            log: Arc::clone(&self.log),
            delay: self.delay,
            failing_payloads: self.failing_payloads.clone(),
            gate: self.gate.clone(),
        }))
    }
}

pub struct MockClient {
    log: Arc<DeliveryLog>,
    delay: Duration,
    failing_payloads: Vec<String>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl DeliveryClient for MockClient {
    async fn deliver(&self, message: &OutboundMessage) -> Result<Placement, DeliveryError> {
        if self.log.closes() > 0 {
            self.log.calls_after_close.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let offset = {
            let mut attempts = self.log.attempts.lock().unwrap();
            attempts.push(message.payload.clone());
            attempts.len() as i64 - 1
        };

        if self.failing_payloads.contains(&message.payload) {
            return Err(DeliveryError::Send("broker unavailable".to_string()));
        }
        Ok(Placement {
            partition: 0,
            offset,
        })
    }

    async fn close(&self) -> Result<(), DeliveryError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
