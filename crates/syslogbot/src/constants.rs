// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Capacity of the queue between ingestion and the dispatcher.
pub const DELIVERY_QUEUE_CAPACITY: usize = 32;

/// Capacity of the queue carrying dynamic subscription requests.
pub const SUBSCRIPTION_QUEUE_CAPACITY: usize = 32;

/// Capacity of the command channel in front of the session manager.
pub const SESSION_COMMAND_CAPACITY: usize = 32;

/// Length of the BSD syslog header ("Mmm dd hh:mm:ss host ") assumed at the start of content.
pub const SYSLOG_HEADER_LENGTH: usize = 27;

/// Drops between two overflow reports when the configuration does not say otherwise.
pub const DEFAULT_OVERFLOW_REPORT_INTERVAL: u64 = 100;

/// Fixed delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Channel every visible relay joins in addition to its routing destinations.
pub const BROADCAST_CHANNEL: &str = "#all";

/// Largest datagram accepted from the syslog transport.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_SYSLOG_PORTS: [u16; 2] = [514, 1514];
