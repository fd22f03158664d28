//! Server configuration limits and timeouts.
//!
//! # Security-first defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Memory overflows
//! - Slowloris attacks
//! - Header flooding
//!
//! # Examples
//!
//! ```no_run
//! use origin_web::limits::{ConnLimits, ReqLimits, ServerLimits};
//! use std::time::Duration;
//!
//! let server_limits = ServerLimits {
//!     max_connections: 5000, // Higher concurrency
//!     ..ServerLimits::default()
//! };
//! let conn_limits = ConnLimits {
//!     socket_read_timeout: Duration::from_secs(5),
//!     max_requests_per_connection: 10_000,
//!     ..ConnLimits::default()
//! };
//! let req_limits = ReqLimits {
//!     header_count: 32,
//!     body_size: 16 * 1024,
//!     ..ReqLimits::default()
//! };
//! ```

use std::time::Duration;

/// Controls server-level concurrency and overload behavior.
///
/// Unlike a fixed worker-pool server, this crate spawns one task per accepted
/// connection; `max_connections` is therefore a ceiling on simultaneously active
/// connections rather than a pre-spawned pool size. When the ceiling is reached,
/// newly accepted connections are either queued briefly (bounded by
/// `max_pending_connections`) or rejected with an immediate `503`.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum number of concurrently active connections (default: `1000`).
    pub max_connections: usize,

    /// Maximum number of accepted-but-not-yet-scheduled connections waiting for a
    /// free slot before the listener starts rejecting with `503` (default: `256`).
    pub max_pending_connections: usize,

    /// Strategy used while waiting for a free connection slot (default: `Sleep(1ms)`).
    pub wait_strategy: WaitStrategy,

    /// Format for error responses generated directly by the server (default: `true`).
    ///
    /// If `true`, errors are rendered as structured JSON with a `code` field; if
    /// `false`, the server sends a response with an empty body.
    pub json_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            max_pending_connections: 256,
            wait_strategy: WaitStrategy::Sleep(Duration::from_millis(1)),
            json_errors: true,
            _priv: (),
        }
    }
}

/// Strategy for waiting when the server is at its connection ceiling.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Uses [`tokio::task::yield_now()`]. Low latency, high CPU usage under load.
    Yield,
    /// Uses [`tokio::time::sleep()`] for the given duration between checks.
    Sleep(Duration),
}

/// Connection-level timeouts and per-connection request limits.
///
/// Defaults balance performance, resource usage, and security. Only change if you
/// understand the consequences.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration to wait for a complete request line + headers (default: `10s`).
    ///
    /// Resets for each new request on a keep-alive connection. The primary defense
    /// against slowloris-style attacks.
    pub socket_read_timeout: Duration,

    /// Maximum duration to wait for a write to complete (default: `10s`).
    pub socket_write_timeout: Duration,

    /// Maximum number of requests served on a single connection (default: `1000`).
    ///
    /// The connection is closed (`Connection: close`) once this limit is reached,
    /// even if the client requested keep-alive.
    pub max_requests_per_connection: usize,

    /// Maximum total lifetime of a connection, from accept to close (default: `5 minutes`).
    ///
    /// A final safety net independent of request count or idle time.
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(10),
            socket_write_timeout: Duration::from_secs(10),
            max_requests_per_connection: 1000,
            connection_lifetime: Duration::from_secs(300),
            _priv: (),
        }
    }
}

/// HTTP request parsing limits.
///
/// These are enforcement ceilings checked while parsing the request line, headers
/// and body; exceeding any of them fails the request with the corresponding
/// `4xx`/`413`/`431` error rather than growing the buffers unboundedly.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum length of the request target, in bytes (default: `8 KiB`).
    pub url_size: usize,
    /// Maximum total size of the request line plus header block, up to and
    /// including the `\r\n\r\n` terminator, in bytes (default: `32 KiB`). The hard
    /// ceiling the parser reads against before it has even split out individual
    /// headers.
    pub header_block_size: usize,
    /// Maximum number of headers per request (default: `100`).
    pub header_count: usize,
    /// Maximum header name length in bytes (default: `128 B`).
    pub header_name_size: usize,
    /// Maximum header value length in bytes (default: `8 KiB`).
    pub header_value_size: usize,
    /// Maximum request body size in bytes, enforced against `Content-Length`
    /// and against the number of bytes actually read (default: `10 MiB`).
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            url_size: 8 * 1024,
            header_block_size: 32 * 1024,
            header_count: 100,
            header_name_size: 128,
            header_value_size: 8 * 1024,
            body_size: 10 * 1024 * 1024,
            _priv: (),
        }
    }
}

/// Response buffer allocation hints.
///
/// The response writer grows a `Vec<u8>` while serializing status-line, headers
/// and (for in-memory bodies) the payload; these control its initial capacity and
/// the point past which the buffer is discarded rather than retained for reuse.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial buffer capacity allocated per response (default: `1024 B`).
    pub default_capacity: usize,
    /// Capacity above which the buffer is not pooled for reuse (default: `64 KiB`).
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 64 * 1024,
            _priv: (),
        }
    }
}

/// Compression middleware thresholds and preference order.
#[derive(Debug, Clone)]
pub struct CompressionLimits {
    /// Responses smaller than this are never compressed (default: `50 B`).
    pub min_body_size: usize,
    /// Responses larger than this are never compressed (default: `10 MiB`).
    pub max_body_size: usize,
    /// Preference order tried against `Accept-Encoding`, highest first
    /// (default: `br, zstd, gzip, x-gzip, deflate`).
    pub preference: Vec<Encoding>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for CompressionLimits {
    fn default() -> Self {
        Self {
            min_body_size: 50,
            max_body_size: 10 * 1024 * 1024,
            preference: vec![
                Encoding::Brotli,
                Encoding::Zstd,
                Encoding::Gzip,
                Encoding::XGzip,
                Encoding::Deflate,
            ],
            _priv: (),
        }
    }
}

/// A `Content-Encoding` this crate knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Brotli,
    Zstd,
    Gzip,
    XGzip,
    Deflate,
}

impl Encoding {
    pub(crate) fn token(&self) -> &'static str {
        match self {
            Encoding::Brotli => "br",
            Encoding::Zstd => "zstd",
            Encoding::Gzip => "gzip",
            Encoding::XGzip => "x-gzip",
            Encoding::Deflate => "deflate",
        }
    }
}

/// TLS listener limits: protocol version range and handshake timeout.
///
/// The minimum supported version defaults to TLS 1.2 — the oldest version the
/// underlying TLS stack is willing to negotiate.
#[derive(Debug, Clone)]
pub struct TlsLimits {
    /// Maximum duration allowed for a TLS handshake to complete (default: `5s`).
    pub handshake_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for TlsLimits {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            _priv: (),
        }
    }
}
