//! Supervisor (C13): owns every configured listener for the process lifetime
//! and shuts them down cleanly on interrupt.

use crate::{
    chain::SharedHandler,
    limits::{ConnLimits, ReqLimits, ServerLimits, TlsLimits},
    net::Endpoint,
    server::listener::{tls_acceptor_from_pem, Listener},
};
use std::{path::PathBuf, time::Duration};
use tokio::{sync::watch, task::JoinHandle};

/// Everything the supervisor needs to bind and run the configured listeners.
///
/// `handler_chain` is the fully assembled root handler (default headers,
/// compression, routing and all other C9 stages already wired in by the
/// caller); the supervisor itself does not build the chain, only runs it
/// behind however many sockets are configured.
pub struct ServerConfig {
    pub handler_chain: SharedHandler,
    pub http_listeners: Vec<Endpoint>,
    pub https_listeners: Vec<Endpoint>,
    pub https_cert_file: Option<PathBuf>,
    pub https_key_file: Option<PathBuf>,

    pub server_limits: ServerLimits,
    pub conn_limits: ConnLimits,
    pub req_limits: ReqLimits,
    pub tls_limits: TlsLimits,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

/// How the supervisor's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// `Ctrl-C` or, on Unix, `SIGTERM`.
    Interrupted,
    /// Every configured listener's accept loop exited on its own (e.g. all
    /// binds failed, or every listener hit an unrecoverable accept error).
    AllListenersDied,
}

/// Startup failure: an endpoint failed to bind, or the TLS material failed
/// to load. The supervisor still runs whichever listeners succeeded.
#[derive(Debug)]
pub struct BindFailure {
    pub endpoint: Endpoint,
    pub error: std::io::Error,
}

impl std::fmt::Display for BindFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to bind {}: {}", self.endpoint, self.error)
    }
}

/// Binds every configured endpoint and runs their accept loops until
/// interrupted or all of them have died, then disposes each remaining
/// listener. Returns the per-endpoint bind failures alongside the reason the
/// run ended, so the caller can decide the process exit code.
pub async fn run(config: ServerConfig) -> (ShutdownReason, Vec<BindFailure>) {
    let mut failures = Vec::new();
    let tls_acceptor = match build_tls_acceptor(&config).await {
        Ok(acceptor) => acceptor,
        Err(error) => {
            log::error!("failed to load TLS material: {error}");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    for endpoint in &config.http_listeners {
        match bind_one(*endpoint, None, &config).await {
            Ok(listener) => tasks.push(spawn_accept_loop(listener, shutdown_rx.clone())),
            Err(error) => {
                let failure = BindFailure { endpoint: *endpoint, error };
                log::error!("{failure}");
                failures.push(failure);
            }
        }
    }
    for endpoint in &config.https_listeners {
        let Some(acceptor) = tls_acceptor.clone() else {
            log::error!("skipping https listener {endpoint}: no TLS material loaded");
            continue;
        };
        match bind_one(*endpoint, Some(acceptor), &config).await {
            Ok(listener) => tasks.push(spawn_accept_loop(listener, shutdown_rx.clone())),
            Err(error) => {
                let failure = BindFailure { endpoint: *endpoint, error };
                log::error!("{failure}");
                failures.push(failure);
            }
        }
    }

    let reason = hold_until_interrupted_or_dead(tasks, shutdown_tx).await;
    (reason, failures)
}

async fn bind_one(
    endpoint: Endpoint,
    tls: Option<tokio_rustls::TlsAcceptor>,
    config: &ServerConfig,
) -> std::io::Result<Listener> {
    Listener::bind(
        endpoint,
        tls,
        config.handler_chain.clone(),
        config.server_limits.clone(),
        config.conn_limits.clone(),
        config.req_limits.clone(),
        config.tls_limits.clone(),
    )
    .await
}

async fn build_tls_acceptor(config: &ServerConfig) -> std::io::Result<Option<tokio_rustls::TlsAcceptor>> {
    if config.https_listeners.is_empty() {
        return Ok(None);
    }
    let (Some(cert_path), Some(key_path)) = (&config.https_cert_file, &config.https_key_file) else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "https_listeners configured without both https_cert_file and https_key_file",
        ));
    };
    let cert_pem = tokio::fs::read(cert_path).await?;
    let key_pem = tokio::fs::read(key_path).await?;
    tls_acceptor_from_pem(&cert_pem, &key_pem).map(Some)
}

/// Runs one listener's accept loop on its own task until either the accept
/// loop dies on its own or a shutdown is signaled, then disposes it.
fn spawn_accept_loop(mut listener: Listener, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept_one() => {
                    match accepted {
                        Ok(true) => continue,
                        Ok(false) | Err(_) => break,
                    }
                }
            }
        }
        listener.dispose();
    })
}

/// Polls once per second to drop finished listener tasks from the tracked
/// set; returns as soon as an interrupt arrives or every listener has died.
async fn hold_until_interrupted_or_dead(
    mut tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
) -> ShutdownReason {
    if tasks.is_empty() {
        return ShutdownReason::AllListenersDied;
    }

    let mut poll = tokio::time::interval(Duration::from_secs(1));
    let reason = loop {
        tokio::select! {
            _ = wait_for_interrupt() => break ShutdownReason::Interrupted,
            _ = poll.tick() => {
                tasks.retain(|task| !task.is_finished());
                if tasks.is_empty() {
                    break ShutdownReason::AllListenersDied;
                }
            }
        }
    };

    if reason == ShutdownReason::Interrupted {
        let _ = shutdown_tx.send(true);
    }
    for task in tasks {
        let _ = task.await;
    }
    reason
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_failure_display_names_the_endpoint() {
        let endpoint = Endpoint::parse("127.0.0.1:0").unwrap();
        let failure = BindFailure {
            endpoint,
            error: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert!(failure.to_string().contains("127.0.0.1:0"));
    }

    #[tokio::test]
    async fn holding_with_no_listeners_reports_all_dead_immediately() {
        let (tx, _rx) = watch::channel(false);
        let reason = hold_until_interrupted_or_dead(Vec::new(), tx).await;
        assert_eq!(reason, ShutdownReason::AllListenersDied);
    }
}
