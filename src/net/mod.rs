//! Transport-level types: addressing, the plaintext/TLS connection socket, and the
//! per-connection identity handed to every handler invocation.

pub mod endpoint;
pub mod socket;

pub use endpoint::Endpoint;
pub use socket::ConnectionSocket;

/// The immutable per-connection context passed to every handler invocation: who's
/// connecting, on which local endpoint, and whether the transport is TLS.
///
/// Constructed once per accepted connection and reused for every request turn on
/// that connection (HTTP/1.x keep-alive never changes these facts mid-connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    pub remote_endpoint: Endpoint,
    pub local_endpoint: Endpoint,
    pub secure: bool,
}

impl ConnectionInfo {
    pub const fn new(remote_endpoint: Endpoint, local_endpoint: Endpoint, secure: bool) -> Self {
        Self {
            remote_endpoint,
            local_endpoint,
            secure,
        }
    }
}
