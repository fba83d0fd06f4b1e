// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while loading the relay configuration. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid routing pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Errors raised by the chat session. Only the initial connection attempt is fatal.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Unable to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server reported an error: {0}")]
    Protocol(String),

    #[error("Connection closed by server")]
    Closed,
}

/// Errors raised while decoding inbound wire data.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty message")]
    Empty,

    #[error("Missing or malformed priority: {0}")]
    Priority(String),

    #[error("Missing command in line: {0}")]
    MissingCommand(String),
}
