// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Relay that forwards syslog records into chat channels.
//!
//! Records arrive over UDP, are classified into a destination channel by host and content
//! rules, pass through a bounded delivery queue that sheds load when full, and are finally
//! written to a single chat session by the dispatcher. Each channel may carry a topic that
//! doubles as a regular-expression filter on what gets delivered there.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod classifier;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod errors;
pub mod hostname;
pub mod irc;
pub mod listener;
pub mod queue;
pub mod registry;
pub mod session;
pub mod syslog;
