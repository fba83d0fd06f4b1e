// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Maps a decoded record to the channel it should be delivered to.
//!
//! Host mappings are looked up first, falling back to the default destination. Content rules
//! are then evaluated against the formatted text and, when one matches, override whatever the
//! host lookup selected. Rules are evaluated in lexicographic order of their pattern and the
//! first match wins.

use std::collections::HashMap;

use regex::Regex;

use crate::config::Config;
use crate::constants::SYSLOG_HEADER_LENGTH;
use crate::errors::ConfigError;
use crate::syslog::Record;

/// A record that has been assigned a destination and is ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedMessage {
    pub destinations: Vec<String>,
    pub from: String,
    pub text: String,
}

/// A content-match rule.
#[derive(Debug, Clone)]
pub struct ContentRule {
    pub pattern: Regex,
    pub destination: String,
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    hosts: HashMap<String, String>,
    default: String,
    rules: Vec<ContentRule>,
}

impl Classifier {
    /// Compiles the routing rules of `config`. An invalid pattern is a configuration error.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let rules = config
            .regex
            .iter()
            .map(|(pattern, destination)| {
                Regex::new(pattern)
                    .map(|pattern| ContentRule {
                        pattern,
                        destination: destination.clone(),
                    })
                    .map_err(|source| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Classifier {
            hosts: config.hosts.clone(),
            default: config.default.clone(),
            rules,
        })
    }

    /// Returns the message to deliver, or `None` when the record has no destination.
    #[must_use]
    pub fn classify(&self, record: &Record) -> Option<ClassifiedMessage> {
        let text = format_text(&record.tag, &record.content);

        let mut destination = self
            .hosts
            .get(&record.source)
            .unwrap_or(&self.default);
        if let Some(rule) = self.rules.iter().find(|rule| rule.pattern.is_match(&text)) {
            destination = &rule.destination;
        }

        if destination.is_empty() {
            return None;
        }
        Some(ClassifiedMessage {
            destinations: vec![destination.clone()],
            from: record.source.clone(),
            text,
        })
    }
}

/// Formats the text shown for a record.
///
/// Content longer than the syslog header is assumed to start with one, and the header is
/// replaced by the tag. Shorter content is shown whole behind the tag. The length check
/// counts a trailing newline, which is removed from the formatted text afterwards.
#[must_use]
pub fn format_text(tag: &str, content: &str) -> String {
    let mut text = match content.char_indices().nth(SYSLOG_HEADER_LENGTH) {
        Some((offset, _)) => format!("{} {}", tag, &content[offset..]),
        None => format!("{}|{}", tag, content),
    };
    if text.ends_with('\n') {
        text.pop();
    }
    text
}
