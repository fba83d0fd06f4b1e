// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Syslog ingestion.
//!
//! A [`SyslogListener`] receives datagrams, decodes them into records, and hands each record
//! to the shared [`Ingestor`], which classifies it and pushes it onto the delivery queue
//! without ever waiting for space.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::classifier::Classifier;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::queue::{DeliveryQueue, EnqueueOutcome};
use crate::syslog::{decode, Record};

/// Classification and queueing shared by every listener.
#[derive(Debug, Clone)]
pub struct Ingestor {
    classifier: Arc<Classifier>,
    queue: DeliveryQueue,
}

impl Ingestor {
    #[must_use]
    pub fn new(classifier: Arc<Classifier>, queue: DeliveryQueue) -> Self {
        Ingestor { classifier, queue }
    }

    /// Routes one record. Records without a destination are dropped silently.
    pub fn handle(&self, record: &Record) -> Option<EnqueueOutcome> {
        let Some(message) = self.classifier.classify(record) else {
            trace!("No destination for record from {}", record.source);
            return None;
        };
        Some(self.queue.enqueue(message))
    }
}

// Where datagrams come from.
enum BufferReader {
    UdpSocket(UdpSocket),

    /// Replays a fixed buffer, for tests.
    #[allow(dead_code)]
    MirrorTest(Vec<u8>, SocketAddr),
}

impl BufferReader {
    async fn read(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let mut buf = [0; MAX_DATAGRAM_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                Ok((buf[..amt].to_owned(), src))
            }
            BufferReader::MirrorTest(data, src) => Ok((data.clone(), *src)),
        }
    }
}

/// Receives syslog datagrams on one UDP socket.
pub struct SyslogListener {
    cancel_token: CancellationToken,
    ingestor: Ingestor,
    buffer_reader: BufferReader,
}

impl SyslogListener {
    /// Binds a UDP socket on `addr`.
    pub async fn bind(
        addr: &str,
        ingestor: Ingestor,
        cancel_token: CancellationToken,
    ) -> std::io::Result<SyslogListener> {
        let socket = UdpSocket::bind(addr).await?;
        debug!("Listening for syslog on {}", socket.local_addr()?);
        Ok(SyslogListener {
            cancel_token,
            ingestor,
            buffer_reader: BufferReader::UdpSocket(socket),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.buffer_reader {
            BufferReader::UdpSocket(socket) => socket.local_addr().ok(),
            BufferReader::MirrorTest(_, _) => None,
        }
    }

    /// Receives until the cancellation token fires.
    pub async fn spin(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                result = self.buffer_reader.read() => match result {
                    Ok((buf, src)) => self.consume(&buf, src.ip()),
                    Err(e) => error!("Failed to receive syslog datagram: {}", e),
                },
            }
        }
        debug!("Syslog listener stopped");
    }

    fn consume(&self, buf: &[u8], source: IpAddr) {
        match decode(buf, source) {
            Ok(record) => {
                trace!("Received record from {}: {:?}", record.source, record.content);
                self.ingestor.handle(&record);
            }
            Err(e) => debug!("Ignoring datagram from {}: {}", source, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::queue::DeliveryReceiver;
    use std::net::Ipv4Addr;

    fn ingestor(json: &str, capacity: usize) -> (Ingestor, DeliveryReceiver) {
        let classifier = Classifier::from_config(&Config::from_json(json).unwrap()).unwrap();
        let (queue, receiver) = DeliveryQueue::new(capacity, 100);
        (Ingestor::new(Arc::new(classifier), queue), receiver)
    }

    #[tokio::test]
    async fn test_mirror_datagram_is_routed() {
        let (ingestor, mut receiver) = ingestor(r##"{"Hosts": {"10.0.0.5": "#db"}}"##, 4);
        let listener = SyslogListener {
            cancel_token: CancellationToken::new(),
            ingestor,
            buffer_reader: BufferReader::MirrorTest(
                b"<13>Oct 16 10:00:00 db01 kern: disk ok\n".to_vec(),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 514),
            ),
        };
        let (buf, src) = listener.buffer_reader.read().await.unwrap();
        listener.consume(&buf, src.ip());

        let message = receiver.dequeue().await.unwrap();
        assert_eq!(message.destinations, vec!["#db".to_string()]);
        assert_eq!(message.from, "10.0.0.5");
        assert_eq!(message.text, "kern disk ok");
    }

    #[test]
    fn test_unroutable_record_is_not_enqueued() {
        let (ingestor, _receiver) = ingestor(r##"{"Hosts": {"10.0.0.5": "#db"}}"##, 1);
        assert_eq!(ingestor.handle(&Record::new("10.0.0.9", "x", "y")), None);
        assert_eq!(
            ingestor.handle(&Record::new("10.0.0.5", "x", "y")),
            Some(EnqueueOutcome::Queued)
        );
        assert_eq!(
            ingestor.handle(&Record::new("10.0.0.5", "x", "y")),
            Some(EnqueueOutcome::Dropped)
        );
        assert_eq!(ingestor.handle(&Record::new("10.0.0.9", "x", "y")), None);
    }

    #[tokio::test]
    async fn test_udp_listener_stops_on_cancel() {
        let (ingestor, mut receiver) = ingestor(r##"{"Default": "#misc"}"##, 4);
        let cancel_token = CancellationToken::new();
        let listener = SyslogListener::bind("127.0.0.1:0", ingestor, cancel_token.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(listener.spin());

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(b"not syslog", addr).await.unwrap();
        socket.send_to(b"<14>hello", addr).await.unwrap();
        let message = receiver.dequeue().await.unwrap();
        assert_eq!(message.text, "|hello");
        assert_eq!(message.from, "127.0.0.1");

        cancel_token.cancel();
        task.await.unwrap();
    }
}
