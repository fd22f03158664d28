//! Connection worker (C11): the loop a spawned task runs for one accepted
//! connection, turn by turn, until keep-alive ends or an unrecoverable error
//! closes it.

use crate::{
    chain::SharedHandler,
    errors::ErrorKind,
    http::{request::Parser, response, types::Version},
    limits::{ConnLimits, ReqLimits, ServerLimits},
    net::{ConnectionInfo, ConnectionSocket},
    Response, StatusCode,
};
use std::{panic::AssertUnwindSafe, time::Instant};

/// Runs one connection to completion: repeated request/response turns until
/// the keep-alive policy says close, the peer disconnects, or a parse/handler
/// error forces the connection shut.
pub async fn run(
    mut socket: ConnectionSocket,
    info: ConnectionInfo,
    chain: SharedHandler,
    server_limits: ServerLimits,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
) {
    let mut parser = Parser::new();
    let started = Instant::now();
    let mut request_count = 0usize;

    loop {
        if request_count >= conn_limits.max_requests_per_connection || started.elapsed() > conn_limits.connection_lifetime {
            break;
        }

        let read = tokio::time::timeout(conn_limits.socket_read_timeout, parser.read_request(&mut socket, &req_limits)).await;
        let parsed = match read {
            Ok(result) => result,
            Err(_) => break, // read timeout: treat like a quiet disconnect
        };

        let mut request = match parsed {
            Ok(Some(request)) => request,
            Ok(None) => break, // clean keep-alive end
            Err(ErrorKind::GracefulDisconnect) | Err(ErrorKind::ConnectionReset) => break,
            Err(error) => {
                log::log!(error.log_level(), "connection error: {error}");
                let _ = socket.send_all(error.as_http(Version::Http11, server_limits.json_errors)).await;
                break;
            }
        };

        let version = request.version();
        let policy = keep_alive_policy(version, request.header("connection"));

        let mut response = match std::panic::AssertUnwindSafe(chain.handle(&info, &mut request))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(payload) => {
                log::error!("handler panicked: {}", panic_message(&payload));
                Response::status_only(StatusCode::InternalServerError)
            }
        };

        response
            .headers_mut()
            .insert("connection", if policy == KeepAlivePolicy::KeepAlive { "keep-alive" } else { "close" });

        if let Err(err) = tokio::time::timeout(conn_limits.socket_write_timeout, response::write(&mut response, &mut socket, version))
            .await
            .unwrap_or_else(|_| Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")))
        {
            log::log!(ErrorKind::from(err).log_level(), "failed to write response");
            break;
        }

        request_count += 1;
        if policy == KeepAlivePolicy::Close {
            break;
        }
    }

    socket.close().await;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeepAlivePolicy {
    KeepAlive,
    Close,
}

/// §4.18's keep-alive table: a pure function of `(version, request Connection)`.
fn keep_alive_policy(version: Version, connection_header: Option<&str>) -> KeepAlivePolicy {
    let says_close = connection_header.is_some_and(|v| v.eq_ignore_ascii_case("close"));
    let says_keep_alive = connection_header.is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"));

    match version {
        Version::Http10 => {
            if says_keep_alive {
                KeepAlivePolicy::KeepAlive
            } else {
                KeepAlivePolicy::Close
            }
        }
        Version::Http11 => {
            if says_close {
                KeepAlivePolicy::Close
            } else {
                KeepAlivePolicy::KeepAlive
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Extension trait so `chain.handle(...)`'s boxed future can be driven through
/// `std::panic::catch_unwind` without a `FutureExt` dependency: a panic inside
/// an `.await`ed future still unwinds through the polling task, and
/// `catch_unwind` around the poll loop is what actually catches it.
trait CatchUnwindFuture: std::future::Future + Sized {
    fn catch_unwind(self) -> CatchUnwind<Self>;
}

impl<F: std::future::Future> CatchUnwindFuture for F {
    fn catch_unwind(self) -> CatchUnwind<Self> {
        CatchUnwind { inner: self }
    }
}

struct CatchUnwind<F> {
    inner: F,
}

impl<F: std::future::Future> std::future::Future for CatchUnwind<F> {
    type Output = std::thread::Result<F::Output>;

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Self::Output> {
        // SAFETY: `inner` is never moved out of; this is a standard pin-projection
        // for a single-field wrapper struct.
        let inner = unsafe { self.map_unchecked_mut(|s| &mut s.inner) };
        std::panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))).map_or_else(
            |payload| std::task::Poll::Ready(Err(payload)),
            |poll| poll.map(Ok),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http11_closes_only_on_explicit_close() {
        assert_eq!(keep_alive_policy(Version::Http11, None), KeepAlivePolicy::KeepAlive);
        assert_eq!(keep_alive_policy(Version::Http11, Some("close")), KeepAlivePolicy::Close);
        assert_eq!(keep_alive_policy(Version::Http11, Some("Keep-Alive")), KeepAlivePolicy::KeepAlive);
    }

    #[test]
    fn http10_keeps_alive_only_when_requested() {
        assert_eq!(keep_alive_policy(Version::Http10, None), KeepAlivePolicy::Close);
        assert_eq!(keep_alive_policy(Version::Http10, Some("keep-alive")), KeepAlivePolicy::KeepAlive);
        assert_eq!(keep_alive_policy(Version::Http10, Some("close")), KeepAlivePolicy::Close);
    }
}
