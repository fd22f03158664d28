//! Response body variants (C5): the five shapes a response can take on the wire.

use std::{path::PathBuf, pin::Pin};
use tokio::{io::AsyncRead, net::TcpStream};

/// Default chunk size for a [`Body::Stream`] body: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// A boxed, owned, `Send` byte source for a streamed response body.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// The shape of a response body. `Bytes`/`File` emit `Content-Length`; `Stream`
/// emits `Transfer-Encoding: chunked`; `Empty` and `Tunnel` emit neither.
pub enum Body {
    /// Zero-length; emits no body bytes and no `Content-Length`. Used for
    /// HEAD-adapted responses and for short-circuited 304/412 precondition
    /// results.
    Empty,
    /// An in-memory buffer; contributes `Content-Length: <len>`.
    Bytes(Vec<u8>),
    /// A filesystem path whose size was captured at construction; contributes
    /// `Content-Length: <size>` and is transmitted via zero-copy send-file when
    /// the transport allows it.
    File { path: PathBuf, len: u64 },
    /// A readable byte source, chunk size [`DEFAULT_CHUNK_SIZE`] unless overridden;
    /// contributes `Transfer-Encoding: chunked` and closes the source when drained
    /// (a boxed trait object's `Drop` handles release on every exit path, error
    /// paths included).
    Stream {
        source: BoxedReader,
        chunk_size: usize,
    },
    /// A second, already-connected socket; contributes no headers. The response
    /// writer splices bytes bidirectionally between the client connection and this
    /// peer until either side closes.
    Tunnel(TcpStream),
}

impl Body {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    pub fn file(path: impl Into<PathBuf>, len: u64) -> Self {
        Self::File {
            path: path.into(),
            len,
        }
    }

    pub fn stream(source: BoxedReader) -> Self {
        Self::Stream {
            source,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn stream_with_chunk_size(source: BoxedReader, chunk_size: usize) -> Self {
        Self::Stream { source, chunk_size }
    }

    pub fn tunnel(peer: TcpStream) -> Self {
        Self::Tunnel(peer)
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }

    /// The byte length this variant would declare as `Content-Length`, if it
    /// declares one at all (`Empty`, `Stream` and `Tunnel` don't: see module docs).
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Empty => None,
            Self::Bytes(data) => Some(data.len() as u64),
            Self::File { len, .. } => Some(*len),
            Self::Stream { .. } | Self::Tunnel(_) => None,
        }
    }

    /// Replaces the body in place with `Empty`, returning what was there. Used by
    /// the HEAD adaptation stage and by the precondition evaluator on 304/412.
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::Empty)
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Body::Empty"),
            Self::Bytes(data) => write!(f, "Body::Bytes({} bytes)", data.len()),
            Self::File { path, len } => write!(f, "Body::File({path:?}, {len} bytes)"),
            Self::Stream { chunk_size, .. } => write!(f, "Body::Stream(chunk_size={chunk_size})"),
            Self::Tunnel(_) => write!(f, "Body::Tunnel"),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Empty
    }
}
