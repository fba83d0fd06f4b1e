// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use syslogbot::{
    classifier::Classifier,
    config::Config,
    constants::{DEFAULT_LISTEN_HOST, DEFAULT_SYSLOG_PORTS, DELIVERY_QUEUE_CAPACITY},
    dispatcher::Dispatcher,
    listener::{Ingestor, SyslogListener},
    queue::DeliveryQueue,
    registry::DestinationRegistry,
    session::{SessionConfig, SessionManager},
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let Some(config_path) = env::args().nth(1) else {
        eprintln!("usage: syslogbot-relay <config.json>");
        return ExitCode::FAILURE;
    };

    // Read before logging is up so the Debug flag can pick the default level.
    let config = Config::load(&config_path);
    let debug_requested = config.as_ref().map(|c| c.debug).unwrap_or(false);
    if let Err(e) = init_logging(debug_requested) {
        eprintln!("could not initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let classifier = match Classifier::from_config(&config) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            error!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel_token = CancellationToken::new();
    let registry = Arc::new(DestinationRegistry::new(config.static_destinations()));
    let (queue, receiver) =
        DeliveryQueue::new(DELIVERY_QUEUE_CAPACITY, config.overflow_report_interval());

    let (mut session, session_handle) = SessionManager::new(
        SessionConfig::from_config(&config),
        Arc::clone(&registry),
        cancel_token.clone(),
    );
    let connection = match session.connect().await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Initial connection failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let session_task = tokio::spawn(session.run(connection));

    // The requester stays alive for the process lifetime so the dispatcher keeps listening
    // for runtime destinations.
    let (dispatcher, _subscriptions) = Dispatcher::new(
        receiver,
        Arc::clone(&registry),
        session_handle,
        config.hide,
        cancel_token.clone(),
    );
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let ingestor = Ingestor::new(classifier, queue);
    let host = env::var("SYSLOGBOT_LISTEN_HOST").unwrap_or_else(|_| DEFAULT_LISTEN_HOST.to_string());
    let mut listener_tasks = Vec::new();
    for port in listen_ports() {
        let addr = format!("{host}:{port}");
        match SyslogListener::bind(&addr, ingestor.clone(), cancel_token.clone()).await {
            Ok(listener) => {
                info!("syslog-udp: starting to listen on {addr}");
                listener_tasks.push(tokio::spawn(listener.spin()));
            }
            Err(e) => {
                error!("Unable to listen on {addr}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    drop(ingestor);

    if let Err(e) = wait_for_shutdown().await {
        error!("Unable to install signal handlers: {e}");
    }
    info!("Shutdown the server...");
    cancel_token.cancel();
    for task in listener_tasks {
        join_task("listener", task).await;
    }
    join_task("dispatcher", dispatcher_task).await;
    join_task("session", session_task).await;
    info!("Server is down");
    ExitCode::SUCCESS
}

// Returns false if the task panicked or was aborted.
async fn join_task(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("The {name} task failed: {e}");
            false
        }
    }
}

fn init_logging(debug_requested: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if debug_requested { "debug" } else { "info" };
    let log_level = env::var("SYSLOGBOT_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| default_level.to_string());

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(log_level)?)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Logging subsystem enabled");
    Ok(())
}

// SYSLOGBOT_PORTS is a comma-separated list; invalid entries are skipped.
fn listen_ports() -> Vec<u16> {
    let ports: Vec<u16> = env::var("SYSLOGBOT_PORTS")
        .map(|val| {
            val.split(',')
                .filter_map(|port| port.trim().parse::<u16>().ok())
                .collect()
        })
        .unwrap_or_default();
    if ports.is_empty() {
        DEFAULT_SYSLOG_PORTS.to_vec()
    } else {
        ports
    }
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => debug!("Received SIGTERM"),
        _ = interrupt.recv() => debug!("Received SIGINT"),
    }
    Ok(())
}
