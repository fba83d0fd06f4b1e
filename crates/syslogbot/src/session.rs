// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Chat session manager.
//!
//! The manager owns the only connection to the chat server. Other components talk to it
//! through a [`SessionHandle`], which queues [`SessionCommand`]s onto a bounded channel. The
//! manager's loop is the single place where inbound protocol events and outbound commands are
//! processed, so event handlers never run concurrently against session state.
//!
//! State transitions:
//!
//! ```text
//! Disconnected -> Connecting            connect()
//! Connecting   -> Connected             welcome received
//! Connecting/Connected -> Renaming      nickname in use
//! Renaming     -> Connected             welcome or own NICK change received
//! any          -> Disconnected          I/O error, EOF, or server ERROR
//! Disconnected -> Connecting            after RECONNECT_DELAY, forever
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::constants::{BROADCAST_CHANNEL, RECONNECT_DELAY, SESSION_COMMAND_CAPACITY};
use crate::errors::SessionError;
use crate::irc::{self, Event, Message};
use crate::registry::DestinationRegistry;

/// Connection parameters for the chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server endpoint as `host:port`.
    pub endpoint: String,
    /// Base nickname; renames append a random suffix to it.
    pub nick: String,
    pub user: String,
    pub password: Option<String>,
    /// Never join channels automatically.
    pub hide: bool,
    /// Log every inbound line at debug level.
    pub debug: bool,
}

impl SessionConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        SessionConfig {
            endpoint: config.server.clone(),
            nick: config.nickname(),
            user: config.username(),
            password: config.password().map(str::to_string),
            hide: config.hide,
            debug: config.debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Send { destination: String, text: String },
    Subscribe(String),
}

/// Cheap, cloneable front door to the session manager.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Builds a handle and the receiving end of its command channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (SessionHandle, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (SessionHandle { tx }, rx)
    }

    pub async fn send(
        &self,
        destination: &str,
        text: &str,
    ) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.tx
            .send(SessionCommand::Send {
                destination: destination.to_string(),
                text: text.to_string(),
            })
            .await
    }

    pub async fn subscribe(
        &self,
        destination: &str,
    ) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.tx
            .send(SessionCommand::Subscribe(destination.to_string()))
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Renaming,
}

/// A live connection to the chat server.
pub struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Connection {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        trace!("-> {}", line);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await
    }
}

pub struct SessionManager {
    config: SessionConfig,
    registry: Arc<DestinationRegistry>,
    rx: mpsc::Receiver<SessionCommand>,
    cancel_token: CancellationToken,
    reconnect_delay: Duration,
    state: SessionState,
    nick: String,
    registered: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        registry: Arc<DestinationRegistry>,
        cancel_token: CancellationToken,
    ) -> (SessionManager, SessionHandle) {
        let (handle, rx) = SessionHandle::channel(SESSION_COMMAND_CAPACITY);
        let nick = config.nick.clone();
        let manager = SessionManager {
            config,
            registry,
            rx,
            cancel_token,
            reconnect_delay: RECONNECT_DELAY,
            state: SessionState::Disconnected,
            nick,
            registered: false,
        };
        (manager, handle)
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Nickname currently claimed (or being claimed) on the server.
    #[must_use]
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Opens the connection and sends the registration lines.
    ///
    /// At process start the caller treats an error here as fatal; later attempts made by
    /// [`SessionManager::run`] are retried forever.
    pub async fn connect(&mut self) -> Result<Connection, SessionError> {
        self.state = SessionState::Connecting;
        self.registered = false;
        self.nick = self.config.nick.clone();

        let stream = TcpStream::connect(&self.config.endpoint)
            .await
            .map_err(|source| SessionError::Connect {
                endpoint: self.config.endpoint.clone(),
                source,
            })?;
        let mut connection = Connection::new(stream);
        for line in self.registration() {
            connection.write_line(&line).await?;
        }
        info!("Connected to {} as {}", self.config.endpoint, self.nick);
        Ok(connection)
    }

    /// Drives the session until the cancellation token fires or every handle is dropped.
    pub async fn run(mut self, connection: Connection) {
        let mut connection = Some(connection);
        loop {
            if let Some(live) = connection.take() {
                match self.pump(live).await {
                    Ok(()) => break,
                    Err(e) => warn!("Disconnected from {}: {}", self.config.endpoint, e),
                }
            }
            self.state = SessionState::Disconnected;
            self.registered = false;

            if !self.back_off().await {
                break;
            }
            match self.connect().await {
                Ok(live) => connection = Some(live),
                Err(e) => {
                    error!("Reconnection failed: {}", e);
                    self.state = SessionState::Disconnected;
                }
            }
        }
        self.state = SessionState::Disconnected;
        debug!("Session manager stopped");
    }

    fn registration(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        if let Some(password) = &self.config.password {
            lines.push(irc::pass(password));
        }
        lines.push(irc::nick(&self.nick));
        lines.push(irc::user(&self.config.user, &self.config.nick));
        lines
    }

    // Ok(()) means shutdown was requested; errors mean the connection is gone.
    async fn pump(&mut self, mut connection: Connection) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    Self::quit(&mut connection).await;
                    return Ok(());
                }
                line = connection.lines.next_line() => {
                    let line = line?.ok_or(SessionError::Closed)?;
                    if self.config.debug {
                        debug!("<- {}", line);
                    } else {
                        trace!("<- {}", line);
                    }
                    let event = match Message::parse(&line) {
                        Ok(message) => Event::from(message),
                        Err(e) => {
                            debug!("Ignoring malformed line: {}", e);
                            continue;
                        }
                    };
                    for outbound in self.handle_event(event)? {
                        connection.write_line(&outbound).await?;
                    }
                }
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        Self::quit(&mut connection).await;
                        return Ok(());
                    };
                    if let Some(outbound) = self.handle_command(command) {
                        connection.write_line(&outbound).await?;
                    }
                }
            }
        }
    }

    async fn quit(connection: &mut Connection) {
        if let Err(e) = connection.write_line("QUIT :shutting down").await {
            debug!("Unable to send QUIT: {}", e);
        }
    }

    // Returns false when the manager should stop instead of reconnecting.
    async fn back_off(&mut self) -> bool {
        info!(
            "Reconnecting to {} in {:?}",
            self.config.endpoint, self.reconnect_delay
        );
        let sleep = tokio::time::sleep(self.reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => return false,
                _ = &mut sleep => return true,
                command = self.rx.recv() => match command {
                    Some(command) => debug!("Dropping {:?} while disconnected", command),
                    None => return false,
                },
            }
        }
    }

    /// Applies one inbound event to the session state and returns the lines to send back.
    ///
    /// A server `ERROR` ends the connection and comes back as [`SessionError::Protocol`].
    pub fn handle_event(&mut self, event: Event) -> Result<Vec<String>, SessionError> {
        match event {
            Event::Welcome { nick } => {
                if !nick.is_empty() {
                    self.nick = nick;
                }
                self.registered = true;
                self.state = SessionState::Connected;
                info!("Registered as {}", self.nick);
                let mut outbound = vec![irc::mode(&self.nick, "+D")];
                outbound.extend(self.subscriptions());
                Ok(outbound)
            }
            Event::NicknameInUse => {
                self.state = SessionState::Renaming;
                let renamed = self.random_nick();
                let previous = std::mem::replace(&mut self.nick, renamed);
                warn!("Nickname {} in use, trying {}", previous, self.nick);
                Ok(vec![irc::nick(&self.nick)])
            }
            Event::NickChanged { old, new } => {
                if self.registered && self.state == SessionState::Renaming && new == self.nick {
                    self.state = SessionState::Connected;
                    info!("Now known as {}", self.nick);
                    return Ok(self.subscriptions());
                }
                if old == self.nick {
                    self.nick = new;
                }
                Ok(Vec::new())
            }
            Event::Topic { channel, topic } | Event::TopicChanged { channel, topic } => {
                self.apply_topic(&channel, &topic);
                Ok(Vec::new())
            }
            Event::Ping(token) => Ok(vec![irc::pong(&token)]),
            Event::Error(text) => {
                error!("Server error: {}", text);
                Err(SessionError::Protocol(text))
            }
            Event::Other(_) => Ok(Vec::new()),
        }
    }

    fn handle_command(&self, command: SessionCommand) -> Option<String> {
        if !self.registered {
            debug!("Dropping {:?} before registration", command);
            return None;
        }
        match command {
            SessionCommand::Send { destination, text } => Some(irc::privmsg(&destination, &text)),
            SessionCommand::Subscribe(destination) => Some(irc::join(&destination)),
        }
    }

    fn subscriptions(&self) -> Vec<String> {
        if self.config.hide {
            return Vec::new();
        }
        std::iter::once(irc::join(BROADCAST_CHANNEL))
            .chain(
                self.registry
                    .destinations()
                    .iter()
                    .map(|destination| irc::join(destination)),
            )
            .collect()
    }

    fn apply_topic(&self, channel: &str, topic: &str) {
        if topic.is_empty() {
            debug!("Topic filter for {} removed", channel);
            self.registry.set_filter(channel, None);
            return;
        }
        match Regex::new(topic) {
            Ok(filter) => {
                debug!("Topic filter for {} set to {:?}", channel, topic);
                self.registry.set_filter(channel, Some(filter));
            }
            Err(e) => warn!("Ignoring topic filter {:?} for {}: {}", topic, channel, e),
        }
    }

    fn random_nick(&self) -> String {
        let suffix: u32 = rand::rng().random_range(0..1u32 << 31);
        format!("{}_{:x}", self.config.nick, suffix)
    }
}
