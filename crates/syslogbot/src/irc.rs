// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Chat protocol (IRC) line handling.
//!
//! Inbound lines are parsed into [`Message`]s and then narrowed to the handful of [`Event`]s
//! the session manager reacts to. Outbound lines are built by the functions at the bottom of
//! this module and never carry a line terminator; the writer appends it.

use crate::errors::ParseError;

pub const RPL_WELCOME: &str = "001";
pub const RPL_TOPIC: &str = "332";
pub const ERR_NICKNAMEINUSE: &str = "433";

/// One protocol line: `[:prefix] COMMAND param... [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    /// Middle parameters followed by the trailing parameter, if any.
    pub params: Vec<String>,
}

impl Message {
    pub fn parse(line: &str) -> Result<Message, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(stripped) => match stripped.split_once(' ') {
                Some((prefix, rest)) => (Some(prefix.to_string()), rest),
                None => return Err(ParseError::MissingCommand(line.to_string())),
            },
            None => (None, line),
        };

        let (middle, trailing) = match rest.split_once(" :") {
            Some((middle, trailing)) => (middle, Some(trailing)),
            None => match rest.strip_prefix(':') {
                Some(trailing) => ("", Some(trailing)),
                None => (rest, None),
            },
        };

        let mut words = middle.split(' ').filter(|word| !word.is_empty());
        let command = words
            .next()
            .ok_or_else(|| ParseError::MissingCommand(line.to_string()))?
            .to_ascii_uppercase();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Message {
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`).
    #[must_use]
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|prefix| prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    fn param(&self, index: usize) -> String {
        self.params.get(index).cloned().unwrap_or_default()
    }
}

/// Inbound events the session manager handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Registration accepted under `nick`.
    Welcome { nick: String },
    /// The nickname we asked for is taken.
    NicknameInUse,
    /// Topic announced when joining `channel`.
    Topic { channel: String, topic: String },
    /// Someone changed the topic of `channel`.
    TopicChanged { channel: String, topic: String },
    NickChanged { old: String, new: String },
    Ping(String),
    /// The server is closing the link.
    Error(String),
    Other(Message),
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        match message.command.as_str() {
            RPL_WELCOME => Event::Welcome {
                nick: message.param(0),
            },
            ERR_NICKNAMEINUSE => Event::NicknameInUse,
            RPL_TOPIC => Event::Topic {
                channel: message.param(1),
                topic: message.param(2),
            },
            "TOPIC" => Event::TopicChanged {
                channel: message.param(0),
                topic: message.param(1),
            },
            "NICK" => Event::NickChanged {
                old: message.source_nick().unwrap_or_default().to_string(),
                new: message.param(0),
            },
            "PING" => Event::Ping(message.param(0)),
            "ERROR" => Event::Error(message.param(0)),
            _ => Event::Other(message),
        }
    }
}

fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[must_use]
pub fn pass(password: &str) -> String {
    format!("PASS {}", sanitize(password))
}

#[must_use]
pub fn nick(nick: &str) -> String {
    format!("NICK {}", sanitize(nick))
}

#[must_use]
pub fn user(user: &str, realname: &str) -> String {
    format!("USER {} 0 * :{}", sanitize(user), sanitize(realname))
}

#[must_use]
pub fn join(channel: &str) -> String {
    format!("JOIN {}", sanitize(channel))
}

#[must_use]
pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {} :{}", sanitize(target), sanitize(text))
}

#[must_use]
pub fn pong(token: &str) -> String {
    format!("PONG :{}", sanitize(token))
}

#[must_use]
pub fn mode(target: &str, modes: &str) -> String {
    format!("MODE {} {}", sanitize(target), sanitize(modes))
}
