// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local identity lookups used to derive the chat nickname and login name.

use std::env;
use tracing::warn;

/// Get the local host name.
///
/// Tries the `HOSTNAME` environment variable first, then `gethostname(2)`, and falls back to
/// `"syslogbot"` so the relay always has something to announce itself with.
#[must_use]
pub fn get_hostname() -> String {
    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    match nix::unistd::gethostname() {
        Ok(hostname_osstr) => {
            if let Some(hostname_str) = hostname_osstr.to_str() {
                if !hostname_str.is_empty() {
                    return hostname_str.to_string();
                }
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using 'syslogbot'");
    "syslogbot".to_string()
}

/// Get the name of the account the process runs as, if it can be resolved.
#[must_use]
pub fn get_username() -> Option<String> {
    match nix::unistd::User::from_uid(nix::unistd::getuid()) {
        Ok(Some(user)) if !user.name.is_empty() => Some(user.name),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to look up current user: {}", e);
            None
        }
    }
}

/// Turn a host name into a nickname the chat server accepts.
#[must_use]
pub fn nickname_from_hostname(hostname: &str) -> String {
    hostname.replace('.', "-")
}
