// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Drains the delivery queue into the chat session.
//!
//! The dispatcher waits on three sources at once: classified messages, dynamic subscription
//! requests, and the shutdown token. Messages are checked against the topic filter of each of
//! their destinations before being handed to the session manager.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::ClassifiedMessage;
use crate::constants::SUBSCRIPTION_QUEUE_CAPACITY;
use crate::queue::DeliveryReceiver;
use crate::registry::DestinationRegistry;
use crate::session::SessionHandle;

/// Submits destinations discovered at runtime to the dispatcher.
#[derive(Debug, Clone)]
pub struct SubscriptionRequester {
    tx: mpsc::Sender<String>,
}

impl SubscriptionRequester {
    /// Waits for room in the subscription queue, which is low volume.
    pub async fn request(&self, destination: &str) -> Result<(), mpsc::error::SendError<String>> {
        self.tx.send(destination.to_string()).await
    }
}

pub struct Dispatcher {
    messages: DeliveryReceiver,
    subscriptions: mpsc::Receiver<String>,
    registry: Arc<DestinationRegistry>,
    session: SessionHandle,
    hide: bool,
    cancel_token: CancellationToken,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        messages: DeliveryReceiver,
        registry: Arc<DestinationRegistry>,
        session: SessionHandle,
        hide: bool,
        cancel_token: CancellationToken,
    ) -> (Dispatcher, SubscriptionRequester) {
        let (tx, subscriptions) = mpsc::channel(SUBSCRIPTION_QUEUE_CAPACITY);
        let dispatcher = Dispatcher {
            messages,
            subscriptions,
            registry,
            session,
            hide,
            cancel_token,
        };
        (dispatcher, SubscriptionRequester { tx })
    }

    pub async fn run(mut self) {
        debug!("Dispatcher started");
        loop {
            // Pending subscriptions go first so a join precedes messages queued after it.
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                Some(destination) = self.subscriptions.recv() => {
                    self.subscribe(&destination).await;
                }
                message = self.messages.dequeue() => match message {
                    Some(message) => self.deliver(message).await,
                    None => {
                        info!("Delivery queue closed, stopping dispatcher");
                        break;
                    }
                },
            }
        }
        debug!("Dispatcher stopped");
    }

    async fn deliver(&self, message: ClassifiedMessage) {
        let line = format!("[{}] {}", message.from, message.text);
        for destination in &message.destinations {
            let allowed = self.registry.filter_for(destination).map_or(true, |filter| {
                filter.is_match(&message.from) || filter.is_match(&message.text)
            });
            if !allowed {
                continue;
            }
            if let Err(e) = self.session.send(destination, &line).await {
                warn!("Session manager gone, dropping message for {}: {}", destination, e);
            }
        }
    }

    async fn subscribe(&self, destination: &str) {
        if !self.registry.register(destination) {
            return;
        }
        info!("New destination {}", destination);
        if self.hide {
            return;
        }
        if let Err(e) = self.session.subscribe(destination).await {
            warn!("Session manager gone, not joining {}: {}", destination, e);
        }
    }
}
