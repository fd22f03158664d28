//! Listener (C12): owns one bound socket, optionally TLS-wrapped, and the
//! `tokio` tasks spawned for each connection it accepts.

use crate::{
    chain::SharedHandler,
    limits::{ConnLimits, ReqLimits, ServerLimits, TlsLimits},
    net::{ConnectionInfo, ConnectionSocket, Endpoint},
    server::connection,
};
use std::sync::Arc;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_rustls::{rustls::ServerConfig, TlsAcceptor};

/// A listener's accept loop plus its bookkeeping of in-flight connection workers.
pub struct Listener {
    tcp: TcpListener,
    tls: Option<TlsAcceptor>,
    endpoint: Endpoint,
    chain: SharedHandler,
    server_limits: ServerLimits,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
    tls_limits: TlsLimits,
    workers: Vec<JoinHandle<()>>,
}

impl Listener {
    pub async fn bind(
        endpoint: Endpoint,
        tls: Option<TlsAcceptor>,
        chain: SharedHandler,
        server_limits: ServerLimits,
        conn_limits: ConnLimits,
        req_limits: ReqLimits,
        tls_limits: TlsLimits,
    ) -> std::io::Result<Self> {
        let tcp = TcpListener::bind(std::net::SocketAddr::from(endpoint)).await?;
        Ok(Self {
            tcp,
            tls,
            endpoint,
            chain,
            server_limits,
            conn_limits,
            req_limits,
            tls_limits,
            workers: Vec::new(),
        })
    }

    pub const fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Accepts one connection, spawns its worker, and records the `JoinHandle`.
    /// Returns `Ok(false)` on an unrecoverable accept error (the caller should
    /// stop calling `accept_one` for this listener); TLS handshake failures are
    /// swallowed here and report `Ok(true)` so the listener keeps accepting.
    pub async fn accept_one(&mut self) -> std::io::Result<bool> {
        let (stream, _peer) = self.tcp.accept().await?;

        let plain = match ConnectionSocket::new_plain(stream) {
            Ok(plain) => plain,
            Err(err) => {
                log::debug!("failed to configure accepted socket: {err}");
                return Ok(true);
            }
        };

        let chain = Arc::clone(&self.chain);
        let server_limits = self.server_limits.clone();
        let conn_limits = self.conn_limits.clone();
        let req_limits = self.req_limits.clone();

        let handle = match (&self.tls, plain) {
            (Some(acceptor), ConnectionSocket::Plain(stream)) => {
                let acceptor = acceptor.clone();
                let handshake_timeout = self.tls_limits.handshake_timeout;
                tokio::spawn(async move {
                    let accepted = tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await;
                    let tls_stream = match accepted {
                        Ok(Ok(tls_stream)) => tls_stream,
                        Ok(Err(err)) => {
                            log::debug!("TLS handshake failed: {err}");
                            return;
                        }
                        Err(_) => {
                            log::debug!("TLS handshake timed out");
                            return;
                        }
                    };

                    let socket = ConnectionSocket::new_tls(tls_stream);
                    let Some(info) = connection_info(&socket, true) else { return };
                    connection::run(socket, info, chain, server_limits, conn_limits, req_limits).await;
                })
            }
            (None, socket @ ConnectionSocket::Plain(_)) => tokio::spawn(async move {
                let Some(info) = connection_info(&socket, false) else { return };
                connection::run(socket, info, chain, server_limits, conn_limits, req_limits).await;
            }),
            (_, socket) => {
                // Only reachable if a `Tls` variant were ever produced before
                // the handshake runs, which `ConnectionSocket::new_plain` never does.
                drop(socket);
                return Ok(true);
            }
        };

        self.workers.push(handle);
        self.sweep();
        Ok(true)
    }

    /// Drops finished worker `JoinHandle`s so the list doesn't grow unbounded
    /// over a listener's lifetime.
    fn sweep(&mut self) {
        self.workers.retain(|handle| !handle.is_finished());
    }

    /// Stops accepting (by dropping the listening socket) and aborts every
    /// outstanding worker task. Logging from aborted workers is expected to be
    /// suppressed by the caller's shutdown path, not by this method.
    pub fn dispose(self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

fn connection_info(socket: &ConnectionSocket, secure: bool) -> Option<ConnectionInfo> {
    let remote = Endpoint::from(socket.peer_addr().ok()?);
    let local = Endpoint::from(socket.local_addr().ok()?);
    Some(ConnectionInfo::new(remote, local, secure))
}

/// Builds a [`ServerConfig`]/[`TlsAcceptor`] from a PEM-encoded certificate
/// chain and private key, already resident in memory (sourcing the bytes —
/// disk, secret manager, ACME — is the caller's concern, not this crate's).
pub fn tls_acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> std::io::Result<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no private key found in PEM input"))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_an_acceptor_from_a_self_signed_cert() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let cert_pem = cert.cert.pem();
        let key_pem = cert.signing_key.serialize_pem();

        assert!(tls_acceptor_from_pem(cert_pem.as_bytes(), key_pem.as_bytes()).is_ok());
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(tls_acceptor_from_pem(b"not a cert", b"not a key").is_err());
    }
}
