// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use syslogbot::{
    classifier::Classifier,
    config::Config,
    dispatcher::{Dispatcher, SubscriptionRequester},
    listener::{Ingestor, SyslogListener},
    queue::DeliveryQueue,
    registry::DestinationRegistry,
    session::{SessionConfig, SessionManager},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{TcpListener, TcpStream, UdpSocket},
    time::{timeout, Duration},
};
use tokio_util::sync::CancellationToken;

type ServerLines = Lines<BufReader<TcpStream>>;

async fn next_line(lines: &mut ServerLines) -> String {
    timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for line")
        .expect("read failed")
        .expect("connection closed")
}

async fn reply(lines: &mut ServerLines, line: &str) {
    let stream = lines.get_mut().get_mut();
    stream
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .expect("write failed");
}

struct Relay {
    syslog_addr: std::net::SocketAddr,
    subscriptions: SubscriptionRequester,
    registry: Arc<DestinationRegistry>,
    cancel_token: CancellationToken,
}

async fn start_relay(irc: &TcpListener) -> (Relay, ServerLines) {
    let config = Config::from_json(&format!(
        r##"{{
            "Hosts": {{"127.0.0.1": "#db"}},
            "Regex": {{"(?i)panic": "#alerts"}},
            "Nick": "relay",
            "Server": "{}",
            "Overflow": 10
        }}"##,
        irc.local_addr().expect("no local addr")
    ))
    .expect("invalid config");

    let cancel_token = CancellationToken::new();
    let classifier = Arc::new(Classifier::from_config(&config).expect("invalid rules"));
    let registry = Arc::new(DestinationRegistry::new(config.static_destinations()));
    let (queue, receiver) = DeliveryQueue::new(32, config.overflow_report_interval());

    let (mut session, handle) = SessionManager::new(
        SessionConfig::from_config(&config),
        Arc::clone(&registry),
        cancel_token.clone(),
    );
    let connection = session.connect().await.expect("initial connection failed");
    tokio::spawn(session.run(connection));

    let (dispatcher, subscriptions) = Dispatcher::new(
        receiver,
        Arc::clone(&registry),
        handle,
        config.hide,
        cancel_token.clone(),
    );
    tokio::spawn(dispatcher.run());

    let listener = SyslogListener::bind(
        "127.0.0.1:0",
        Ingestor::new(classifier, queue),
        cancel_token.clone(),
    )
    .await
    .expect("unable to bind syslog socket");
    let syslog_addr = listener.local_addr().expect("no local addr");
    tokio::spawn(listener.spin());

    let (stream, _) = irc.accept().await.expect("relay never connected");
    let lines = BufReader::new(stream).lines();
    (
        Relay {
            syslog_addr,
            subscriptions,
            registry,
            cancel_token,
        },
        lines,
    )
}

#[tokio::test]
async fn syslog_records_reach_their_channels() {
    let irc = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("unable to bind chat server");
    let (relay, mut lines) = start_relay(&irc).await;

    assert_eq!(next_line(&mut lines).await, "NICK relay");
    assert!(next_line(&mut lines).await.starts_with("USER "));
    reply(&mut lines, ":srv 001 relay :Welcome").await;
    assert_eq!(next_line(&mut lines).await, "MODE relay +D");
    assert_eq!(next_line(&mut lines).await, "JOIN #all");
    assert_eq!(next_line(&mut lines).await, "JOIN #alerts");
    assert_eq!(next_line(&mut lines).await, "JOIN #db");

    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind UDP socket");

    socket
        .send_to(b"<11>Oct 16 10:00:00 db01 kern: disk panic at sector 9\n", relay.syslog_addr)
        .await
        .expect("unable to send record");
    assert_eq!(
        next_line(&mut lines).await,
        "PRIVMSG #alerts :[127.0.0.1] kern disk panic at sector 9"
    );

    // Topic on join installs a filter for #db.
    reply(&mut lines, ":srv 332 relay #db :ERROR").await;
    reply(&mut lines, "PING :sync").await;
    assert_eq!(next_line(&mut lines).await, "PONG :sync");
    assert!(relay.registry.filter_for("#db").is_some());

    socket
        .send_to(b"<14>Oct 16 10:00:01 db01 kern: service OK\n", relay.syslog_addr)
        .await
        .expect("unable to send record");
    socket
        .send_to(b"<11>Oct 16 10:00:02 db01 kern: service ERROR: disk full\n", relay.syslog_addr)
        .await
        .expect("unable to send record");
    assert_eq!(
        next_line(&mut lines).await,
        "PRIVMSG #db :[127.0.0.1] kern service ERROR: disk full"
    );

    relay
        .subscriptions
        .request("#late")
        .await
        .expect("dispatcher gone");
    assert_eq!(next_line(&mut lines).await, "JOIN #late");
    assert!(relay.registry.is_known("#late"));

    relay.cancel_token.cancel();
    assert_eq!(next_line(&mut lines).await, "QUIT :shutting down");
}
