// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded queue between ingestion and the dispatcher.
//!
//! Producers never wait for space: when the queue is full the message is dropped and the
//! overflow counter is bumped. Every `report_interval` drops, the last dropped message is
//! logged so an operator can see what is being shed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::classifier::ClassifiedMessage;

/// Process-wide count of messages dropped because the delivery queue was full.
#[derive(Debug, Clone, Default)]
pub struct OverflowCounter(Arc<AtomicU64>);

impl OverflowCounter {
    /// Records one drop and returns the new total.
    fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// The queue was full and the message is lost.
    Dropped,
    /// The dispatcher is gone.
    Closed,
}

/// Producer side of the delivery queue. Cheap to clone; clones share the overflow counter.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<ClassifiedMessage>,
    overflow: OverflowCounter,
    report_interval: u64,
}

/// Consumer side of the delivery queue, owned by the dispatcher.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::Receiver<ClassifiedMessage>,
}

impl DeliveryQueue {
    #[must_use]
    pub fn new(capacity: usize, report_interval: u64) -> (DeliveryQueue, DeliveryReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = DeliveryQueue {
            tx,
            overflow: OverflowCounter::default(),
            report_interval: report_interval.max(1),
        };
        (queue, DeliveryReceiver { rx })
    }

    pub fn enqueue(&self, message: ClassifiedMessage) -> EnqueueOutcome {
        match self.tx.try_send(message) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(message)) => {
                let dropped = self.overflow.increment();
                if dropped % self.report_interval == 0 {
                    warn!(
                        "overflow threshold on: {} dropped, last from {} to {:?}: {}",
                        dropped, message.from, message.destinations, message.text
                    );
                }
                EnqueueOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                trace!("Delivery queue closed, discarding message from {}", message.from);
                EnqueueOutcome::Closed
            }
        }
    }

    #[must_use]
    pub fn overflow(&self) -> &OverflowCounter {
        &self.overflow
    }
}

impl DeliveryReceiver {
    /// Waits for the next message. Returns `None` once every producer has been dropped.
    pub async fn dequeue(&mut self) -> Option<ClassifiedMessage> {
        self.rx.recv().await
    }
}
