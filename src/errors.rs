use crate::http::Version;
use std::{error, fmt, io};

/// Every way a connection turn can fail, mapped to an HTTP disposition and a log level
/// (see the error-handling table this crate's documentation describes).
///
/// Most variants are terminal for the *parse* of a single request; `HandlerException`
/// and `UpstreamError` instead replace whatever response the chain would have produced.
#[derive(Debug)]
pub enum ErrorKind {
    InvalidMethod,
    InvalidUrl,
    InvalidVersion,
    UnsupportedVersion,
    InvalidHeader,
    TooManyHeaders,
    InvalidContentLength,
    InvalidConnection,

    BodyTooLarge,
    BodyMismatch { expected: usize, available: usize },

    /// `recv` returned zero bytes: the peer closed its write half.
    GracefulDisconnect,
    /// The peer reset the connection (`ECONNRESET` and friends).
    ConnectionReset,

    /// A chain stage or terminal handler panicked; caught at the worker boundary.
    HandlerException,
    /// The reverse/forward proxy's upstream connection failed or returned garbage.
    UpstreamError,
    /// File-router path resolved outside the document root, or otherwise disallowed.
    PathNotAllowed,
    /// Method not supported by the terminal handler that received the request.
    MethodNotAllowed,
    /// Basic-auth credentials missing or wrong.
    AuthFailure,

    /// TLS handshake failed during accept; the listener keeps running.
    TlsHandshakeError,
    /// A listener failed to bind its configured endpoint.
    BindFailure,

    ServiceUnavailable,
    Io(IoError),
}

/// A fieldless copy of [`ErrorKind`]'s variants, used only so the match arms
/// generated by `http_errors!` below can be written uniformly as bare paths
/// regardless of which variants happen to carry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorTag {
    InvalidMethod,
    InvalidUrl,
    InvalidVersion,
    UnsupportedVersion,
    InvalidHeader,
    TooManyHeaders,
    InvalidContentLength,
    InvalidConnection,
    BodyTooLarge,
    BodyMismatch,
    GracefulDisconnect,
    ConnectionReset,
    HandlerException,
    UpstreamError,
    PathNotAllowed,
    MethodNotAllowed,
    AuthFailure,
    TlsHandshakeError,
    BindFailure,
    ServiceUnavailable,
    Io,
}

macro_rules! http_errors {
    ($($name:ident: $num:literal, $status_code:expr, $len:literal => $json:literal; )*) => {
        fn tag(&self) -> ErrorTag {
            match self {
                Self::InvalidMethod => ErrorTag::InvalidMethod,
                Self::InvalidUrl => ErrorTag::InvalidUrl,
                Self::InvalidVersion => ErrorTag::InvalidVersion,
                Self::UnsupportedVersion => ErrorTag::UnsupportedVersion,
                Self::InvalidHeader => ErrorTag::InvalidHeader,
                Self::TooManyHeaders => ErrorTag::TooManyHeaders,
                Self::InvalidContentLength => ErrorTag::InvalidContentLength,
                Self::InvalidConnection => ErrorTag::InvalidConnection,
                Self::BodyTooLarge => ErrorTag::BodyTooLarge,
                Self::BodyMismatch { .. } => ErrorTag::BodyMismatch,
                Self::GracefulDisconnect => ErrorTag::GracefulDisconnect,
                Self::ConnectionReset => ErrorTag::ConnectionReset,
                Self::HandlerException => ErrorTag::HandlerException,
                Self::UpstreamError => ErrorTag::UpstreamError,
                Self::PathNotAllowed => ErrorTag::PathNotAllowed,
                Self::MethodNotAllowed => ErrorTag::MethodNotAllowed,
                Self::AuthFailure => ErrorTag::AuthFailure,
                Self::TlsHandshakeError => ErrorTag::TlsHandshakeError,
                Self::BindFailure => ErrorTag::BindFailure,
                Self::ServiceUnavailable => ErrorTag::ServiceUnavailable,
                Self::Io(_) => ErrorTag::Io,
            }
        }

        /// Renders this error as a complete, ready-to-write HTTP response.
        pub(crate) fn as_http(&self, version: Version, json: bool) -> &'static [u8] {
            match (json, self.tag(), version) { $(
                (true, ErrorTag::$name, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, ErrorTag::$name, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
                (true, ErrorTag::$name, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, ErrorTag::$name, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
            )* }.as_bytes()
        }

        /// The numeric status this error renders as, useful to callers that only
        /// need the disposition (tests, metrics) without a serialized response.
        pub fn status(&self) -> u16 {
            match self.tag() { $( ErrorTag::$name => $num, )* }
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidMethod: 400, "400 Bad Request", "55"
            => r#"{"error":"Invalid HTTP method","code":"INVALID_METHOD"}"#;
        InvalidUrl: 400, "400 Bad Request", "51"
            => r#"{"error":"Invalid URL format","code":"INVALID_URL"}"#;
        InvalidVersion: 400, "400 Bad Request", "57"
            => r#"{"error":"Invalid HTTP version","code":"INVALID_VERSION"}"#;
        UnsupportedVersion: 505, "505 HTTP Version Not Supported", "67"
            => r#"{"error":"HTTP version not supported","code":"UNSUPPORTED_VERSION"}"#;
        InvalidHeader: 400, "400 Bad Request", "57"
            => r#"{"error":"Invalid header format","code":"INVALID_HEADER"}"#;
        TooManyHeaders: 431, "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        InvalidContentLength: 400, "400 Bad Request", "66"
            => r#"{"error":"Invalid Content-Length","code":"INVALID_CONTENT_LENGTH"}"#;
        InvalidConnection: 400, "400 Bad Request", "65"
            => r#"{"error":"Invalid Connection header","code":"INVALID_CONNECTION"}"#;
        BodyTooLarge: 413, "413 Payload Too Large", "58"
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
        BodyMismatch: 400, "400 Bad Request", "55"
            => r#"{"error":"Body length mismatch","code":"BODY_MISMATCH"}"#;
        GracefulDisconnect: 400, "400 Bad Request", "46"
            => r#"{"error":"Connection closed","code":"DISCONNECT"}"#;
        ConnectionReset: 400, "400 Bad Request", "44"
            => r#"{"error":"Connection reset","code":"RESET"}"#;
        HandlerException: 500, "500 Internal Server Error", "52"
            => r#"{"error":"Internal server error","code":"HANDLER_PANIC"}"#;
        UpstreamError: 502, "502 Bad Gateway", "46"
            => r#"{"error":"Upstream error","code":"BAD_GATEWAY"}"#;
        PathNotAllowed: 400, "400 Bad Request", "49"
            => r#"{"error":"Path not allowed","code":"PATH_DENIED"}"#;
        MethodNotAllowed: 405, "405 Method Not Allowed", "52"
            => r#"{"error":"Method not allowed","code":"METHOD_DENIED"}"#;
        AuthFailure: 401, "401 Unauthorized", "47"
            => r#"{"error":"Authentication required","code":"AUTH_FAILED"}"#;
        TlsHandshakeError: 400, "400 Bad Request", "49"
            => r#"{"error":"TLS handshake failed","code":"TLS_ERROR"}"#;
        BindFailure: 503, "503 Service Unavailable", "46"
            => r#"{"error":"Listener unavailable","code":"BIND_FAILED"}"#;
        ServiceUnavailable: 503, "503 Service Unavailable", "72"
            => r#"{"error":"Service temporarily unavailable","code":"SERVICE_UNAVAILABLE"}"#;
        Io: 503, "503 Service Unavailable", "48"
            => r#"{"error":"I/O error occurred","code":"IO_ERROR"}"#;
    }

    /// The `log` level this error is recorded at, per the connection-worker error table.
    pub(crate) fn log_level(&self) -> log::Level {
        match self {
            ErrorKind::InvalidMethod
            | ErrorKind::InvalidUrl
            | ErrorKind::InvalidVersion
            | ErrorKind::InvalidHeader
            | ErrorKind::InvalidContentLength
            | ErrorKind::InvalidConnection => log::Level::Info,
            ErrorKind::TooManyHeaders | ErrorKind::BodyTooLarge | ErrorKind::BodyMismatch { .. } => {
                log::Level::Warn
            }
            ErrorKind::GracefulDisconnect | ErrorKind::ConnectionReset => log::Level::Trace,
            ErrorKind::HandlerException => log::Level::Error,
            ErrorKind::UpstreamError => log::Level::Warn,
            ErrorKind::PathNotAllowed | ErrorKind::MethodNotAllowed | ErrorKind::AuthFailure => {
                log::Level::Info
            }
            ErrorKind::TlsHandshakeError => log::Level::Debug,
            ErrorKind::BindFailure => log::Level::Error,
            ErrorKind::UnsupportedVersion | ErrorKind::ServiceUnavailable => log::Level::Warn,
            ErrorKind::Io(_) => log::Level::Warn,
        }
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind as K;
        match err.kind() {
            K::ConnectionReset | K::BrokenPipe => ErrorKind::ConnectionReset,
            K::UnexpectedEof => ErrorKind::GracefulDisconnect,
            _ => ErrorKind::Io(IoError(err)),
        }
    }
}

#[derive(Debug)]
pub struct IoError(pub io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
