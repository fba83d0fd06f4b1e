// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Relay configuration.
//!
//! The configuration is a JSON document read once at startup. Every key is optional:
//!
//! ```json
//! {
//!   "Debug": false,
//!   "Default": "#misc",
//!   "Hide": false,
//!   "Hosts": { "10.0.0.5": "#db" },
//!   "Regex": { "(?i)panic": "#alerts" },
//!   "Overflow": 100,
//!   "Nick": "relay",
//!   "Server": "irc.example.com:6667",
//!   "Password": "secret"
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::constants::DEFAULT_OVERFLOW_REPORT_INTERVAL;
use crate::errors::ConfigError;
use crate::hostname::{get_hostname, get_username, nickname_from_hostname};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// Log every inbound protocol line.
    pub debug: bool,
    /// Destination for records whose source has no host mapping. Empty means drop.
    pub default: String,
    /// Do not join any channel automatically.
    pub hide: bool,
    /// Source address to destination.
    pub hosts: HashMap<String, String>,
    /// Content pattern to destination. Kept sorted so evaluation order is stable.
    pub regex: BTreeMap<String, String>,
    /// Drops between two overflow reports; values below 1 select the default.
    pub overflow: u64,
    pub nick: String,
    /// Chat server endpoint as `host:port`.
    pub server: String,
    pub password: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    #[must_use]
    pub fn overflow_report_interval(&self) -> u64 {
        if self.overflow < 1 {
            DEFAULT_OVERFLOW_REPORT_INTERVAL
        } else {
            self.overflow
        }
    }

    /// Configured nickname, or the local host name with dots turned into dashes.
    #[must_use]
    pub fn nickname(&self) -> String {
        if self.nick.is_empty() {
            nickname_from_hostname(&get_hostname())
        } else {
            self.nick.clone()
        }
    }

    /// Login name announced to the server: the current account, or the nickname.
    #[must_use]
    pub fn username(&self) -> String {
        get_username().unwrap_or_else(|| self.nickname())
    }

    /// Every destination named by a host mapping or a content rule.
    ///
    /// The default destination is deliberately absent: it is only joined once it is also
    /// named by a rule or requested at runtime.
    #[must_use]
    pub fn static_destinations(&self) -> BTreeSet<String> {
        self.hosts
            .values()
            .chain(self.regex.values())
            .filter(|destination| !destination.is_empty())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        if self.password.is_empty() {
            None
        } else {
            Some(self.password.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_CONFIG: &str = r##"{
        "Debug": true,
        "Default": "#misc",
        "Hide": false,
        "Hosts": {"10.0.0.5": "#db", "10.0.0.6": "#web"},
        "Regex": {"(?i)panic": "#alerts"},
        "Overflow": 50,
        "Nick": "relay",
        "Server": "irc.example.com:6667",
        "Password": "hunter2"
    }"##;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_json(FULL_CONFIG).unwrap();
        assert!(config.debug);
        assert_eq!(config.default, "#misc");
        assert_eq!(config.hosts.get("10.0.0.5").map(String::as_str), Some("#db"));
        assert_eq!(config.regex.get("(?i)panic").map(String::as_str), Some("#alerts"));
        assert_eq!(config.overflow_report_interval(), 50);
        assert_eq!(config.nickname(), "relay");
        assert_eq!(config.server, "irc.example.com:6667");
        assert_eq!(config.password(), Some("hunter2"));
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.overflow_report_interval(), 100);
        assert_eq!(config.password(), None);
        assert!(!config.nickname().contains('.'));
    }

    #[test]
    fn test_static_destinations_are_distinct() {
        let config = Config::from_json(
            r##"{"Default": "#misc", "Hosts": {"a": "#db", "b": "#db"}, "Regex": {"x": "#db", "y": "#alerts"}}"##,
        )
        .unwrap();
        let destinations: Vec<_> = config.static_destinations().into_iter().collect();
        assert_eq!(destinations, vec!["#alerts".to_string(), "#db".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.nick, "relay");
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_json_is_parse_error() {
        let err = Config::from_json("{\"Hosts\": [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
