//! The in-process upstream HTTP client (§6 external interface): the reverse
//! proxy dispatches through this trait rather than pulling in a third-party
//! HTTP client crate. The default implementation opens a fresh plain TCP
//! connection per call, writes the request with the same wire grammar the
//! connection worker's own response writer uses, and reads the reply by hand
//! — no connection pool, since nothing here requires one across calls.

use crate::{errors::ErrorKind, http::headers::HeaderMap, Method};
use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
};

/// A parsed upstream authority: where to dial and whether TLS is expected.
#[derive(Debug, Clone)]
pub struct UpstreamAddress {
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl UpstreamAddress {
    /// Parses a base URL of the form `http(s)://host[:port]`. Only scheme,
    /// host and port are retained; any path on the base URL is ignored (the
    /// reverse proxy always forwards the *request's* path, not the base's).
    pub fn parse(base: &str) -> Result<Self, ErrorKind> {
        let (secure, rest) = if let Some(rest) = base.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(ErrorKind::UpstreamError);
        };

        let authority = rest.split('/').next().unwrap_or(rest);
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| ErrorKind::UpstreamError)?),
            None => (authority, if secure { 443 } else { 80 }),
        };
        if host.is_empty() {
            return Err(ErrorKind::UpstreamError);
        }

        Ok(Self {
            secure,
            host: host.to_owned(),
            port,
        })
    }

    /// The `host[:port]` form suitable for a forwarded `Host` header.
    pub fn authority(&self) -> String {
        match (self.secure, self.port) {
            (false, 80) | (true, 443) => self.host.clone(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

/// One upstream request, already preprocessed (hop-by-hop headers stripped,
/// `X-Forwarded-*`/`Forwarded` applied) by the caller.
pub struct UpstreamRequest<'a> {
    pub method: Method,
    pub target: &'a str,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// The shape an upstream's response body arrives in, mirroring [`crate::http::body::Body`]'s
/// two materialized-vs-streamed cases (a `Tunnel`-shaped upstream response is not possible:
/// CONNECT is handled entirely by the forward proxy, never dispatched through this client).
pub enum UpstreamBody {
    Bytes(Vec<u8>),
    Stream(crate::http::body::BoxedReader),
}

pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

pub type UpstreamFuture<'a> = Pin<Box<dyn Future<Output = Result<UpstreamResponse, ErrorKind>> + Send + 'a>>;

/// The contract the reverse proxy dispatches through (§6).
pub trait UpstreamClient: Send + Sync + 'static {
    fn dispatch<'a>(
        &'a self,
        address: &'a UpstreamAddress,
        request: UpstreamRequest<'a>,
        stream_threshold: u64,
    ) -> UpstreamFuture<'a>;
}

/// The default [`UpstreamClient`]: one TCP connection per call, closed afterwards.
///
/// TLS upstreams (`https://`) are out of reach for this default client: dialing one
/// safely needs a certificate-validating connector (`webpki-roots`/`rustls-native-certs`),
/// and neither is part of this crate's dependency stack (see `DESIGN.md`). Such a
/// dispatch fails with [`ErrorKind::UpstreamError`], which the reverse proxy renders as
/// `502 Bad Gateway` — the same disposition any other upstream failure gets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpUpstreamClient;

impl UpstreamClient for TcpUpstreamClient {
    fn dispatch<'a>(
        &'a self,
        address: &'a UpstreamAddress,
        request: UpstreamRequest<'a>,
        stream_threshold: u64,
    ) -> UpstreamFuture<'a> {
        Box::pin(async move {
            if address.secure {
                return Err(ErrorKind::UpstreamError);
            }

            let mut stream = TcpStream::connect((address.host.as_str(), address.port))
                .await
                .map_err(|_| ErrorKind::UpstreamError)?;

            let head = serialize_request(request.method, request.target, request.headers, request.body.len());
            stream.write_all(&head).await.map_err(|_| ErrorKind::UpstreamError)?;
            if !request.body.is_empty() {
                stream.write_all(request.body).await.map_err(|_| ErrorKind::UpstreamError)?;
            }

            read_response(stream, stream_threshold).await
        })
    }
}

fn serialize_request(method: Method, target: &str, headers: &HeaderMap, body_len: usize) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(target.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers.iter() {
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"content-length: ");
    head.extend_from_slice(body_len.to_string().as_bytes());
    head.extend_from_slice(b"\r\nconnection: close\r\n\r\n");
    head
}

async fn read_response(mut stream: TcpStream, stream_threshold: u64) -> Result<UpstreamResponse, ErrorKind> {
    let (status, mut headers, leftover) = read_head(&mut stream).await?;

    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let content_length = headers.content_length();
    headers.remove("connection");
    headers.remove("transfer-encoding");

    let source = PrefixedStream::new(leftover, stream);

    let body = if chunked {
        UpstreamBody::Stream(Box::pin(ChunkedDecoder::new(source)))
    } else {
        match content_length {
            Some(len) if len as u64 > stream_threshold => {
                UpstreamBody::Stream(Box::pin(BoundedReader::new(source, len as u64)))
            }
            Some(len) => UpstreamBody::Bytes(read_exact_into_vec(source, len).await?),
            None => UpstreamBody::Bytes(read_to_end_into_vec(source).await?),
        }
    };

    Ok(UpstreamResponse { status, headers, body })
}

async fn read_head(stream: &mut TcpStream) -> Result<(u16, HeaderMap, Vec<u8>), ErrorKind> {
    let mut buf = Vec::with_capacity(1024);
    let header_end = loop {
        if let Some(pos) = memchr::memmem::find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > 64 * 1024 {
            return Err(ErrorKind::UpstreamError);
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.map_err(|_| ErrorKind::UpstreamError)?;
        if n == 0 {
            return Err(ErrorKind::UpstreamError);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = &buf[..header_end - 2];
    let mut lines = head.split(|&b| b == b'\n');
    let status_line = lines.next().ok_or(ErrorKind::UpstreamError)?;
    let status_line = status_line.strip_suffix(b"\r").unwrap_or(status_line);

    let mut parts = status_line.splitn(3, |&b| b == b' ');
    let _version = parts.next().ok_or(ErrorKind::UpstreamError)?;
    let status_bytes = parts.next().ok_or(ErrorKind::UpstreamError)?;
    let status: u16 = std::str::from_utf8(status_bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ErrorKind::UpstreamError)?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let colon = memchr::memchr(b':', line).ok_or(ErrorKind::UpstreamError)?;
        let name = std::str::from_utf8(&line[..colon]).map_err(|_| ErrorKind::UpstreamError)?;
        let value = std::str::from_utf8(trim_ascii(&line[colon + 1..])).map_err(|_| ErrorKind::UpstreamError)?;
        headers.append(name, value);
    }

    Ok((status, headers, buf[header_end..].to_vec()))
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}

async fn read_exact_into_vec<R: AsyncRead + Unpin>(mut source: R, len: usize) -> Result<Vec<u8>, ErrorKind> {
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf).await.map_err(|_| ErrorKind::UpstreamError)?;
    Ok(buf)
}

async fn read_to_end_into_vec<R: AsyncRead + Unpin>(mut source: R) -> Result<Vec<u8>, ErrorKind> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf).await.map_err(|_| ErrorKind::UpstreamError)?;
    Ok(buf)
}

/// Replays a prefix of already-consumed bytes before resuming reads on `inner`.
/// The upstream's header scan commonly over-reads into the start of the body, and
/// this is how those bytes get handed onward without a second round trip.
struct PrefixedStream {
    prefix: Vec<u8>,
    prefix_pos: usize,
    inner: TcpStream,
}

impl PrefixedStream {
    fn new(prefix: Vec<u8>, inner: TcpStream) -> Self {
        Self {
            prefix,
            prefix_pos: 0,
            inner,
        }
    }
}

impl AsyncRead for PrefixedStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.prefix_pos < this.prefix.len() {
            let remaining = &this.prefix[this.prefix_pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            this.prefix_pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

/// Limits a streamed upstream body to its declared `Content-Length` when that
/// length exceeds the reverse proxy's stream threshold.
struct BoundedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R> BoundedReader<R> {
    fn new(inner: R, remaining: u64) -> Self {
        Self { inner, remaining }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for BoundedReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            return Poll::Ready(Ok(()));
        }
        let limit = (this.remaining as usize).min(buf.remaining());
        let mut sub_buf = buf.take(limit);
        let filled_before = sub_buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, &mut sub_buf) {
            Poll::Ready(Ok(())) => {
                let read = sub_buf.filled().len() - filled_before;
                buf.advance(read);
                this.remaining -= read as u64;
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[derive(Clone, Copy)]
enum ChunkState {
    Size,
    Data(usize),
    DataCrlf,
    TrailerOrEnd,
    Done,
}

/// Decodes a chunked-transfer-encoded byte stream into its plain payload.
/// Trailer header lines (after the terminal `0` chunk) are read and discarded.
struct ChunkedDecoder<R> {
    inner: R,
    raw: Vec<u8>,
    raw_pos: usize,
    state: ChunkState,
}

impl<R: AsyncRead + Unpin> ChunkedDecoder<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            raw: Vec::new(),
            raw_pos: 0,
            state: ChunkState::Size,
        }
    }

    fn find_newline(&self) -> Option<usize> {
        memchr::memchr(b'\n', &self.raw[self.raw_pos..]).map(|i| self.raw_pos + i)
    }

    /// Reads more bytes from `inner` into the scratch buffer. `Ready(Ok(true))`
    /// means progress was made and the caller should retry parsing; `Ready(Ok(false))`
    /// means the upstream closed before the chunked body terminated.
    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<bool>> {
        if self.raw_pos > 0 {
            self.raw.drain(..self.raw_pos);
            self.raw_pos = 0;
        }
        let start = self.raw.len();
        self.raw.resize(start + 8192, 0);
        let mut read_buf = ReadBuf::new(&mut self.raw[start..]);
        match Pin::new(&mut self.inner).poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let n = read_buf.filled().len();
                self.raw.truncate(start + n);
                Poll::Ready(Ok(n > 0))
            }
            Poll::Ready(Err(e)) => {
                self.raw.truncate(start);
                Poll::Ready(Err(e))
            }
            Poll::Pending => {
                self.raw.truncate(start);
                Poll::Pending
            }
        }
    }
}

macro_rules! need_more_bytes {
    ($this:expr, $cx:expr) => {
        match $this.poll_fill($cx) {
            Poll::Ready(Ok(true)) => continue,
            Poll::Ready(Ok(false)) => {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunked body")))
            }
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }
    };
}

impl<R: AsyncRead + Unpin> AsyncRead for ChunkedDecoder<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, out: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match this.state {
                ChunkState::Done => return Poll::Ready(Ok(())),
                ChunkState::Size => {
                    let Some(nl) = this.find_newline() else {
                        need_more_bytes!(this, cx);
                    };
                    let line = &this.raw[this.raw_pos..nl];
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    let size_part = line.split(|&b| b == b';').next().unwrap_or(line);
                    let size = match std::str::from_utf8(size_part)
                        .ok()
                        .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
                    {
                        Some(size) => size,
                        None => {
                            return Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, "bad chunk size")))
                        }
                    };
                    this.raw_pos = nl + 1;
                    this.state = if size == 0 { ChunkState::TrailerOrEnd } else { ChunkState::Data(size) };
                }
                ChunkState::Data(0) => this.state = ChunkState::DataCrlf,
                ChunkState::Data(remaining) => {
                    if this.raw_pos >= this.raw.len() {
                        need_more_bytes!(this, cx);
                    }
                    let avail = this.raw.len() - this.raw_pos;
                    let n = avail.min(remaining).min(out.remaining());
                    if n == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    out.put_slice(&this.raw[this.raw_pos..this.raw_pos + n]);
                    this.raw_pos += n;
                    this.state = ChunkState::Data(remaining - n);
                    return Poll::Ready(Ok(()));
                }
                ChunkState::DataCrlf => {
                    if this.raw.len() - this.raw_pos < 2 {
                        need_more_bytes!(this, cx);
                    }
                    this.raw_pos += 2;
                    this.state = ChunkState::Size;
                }
                ChunkState::TrailerOrEnd => {
                    let Some(nl) = this.find_newline() else {
                        need_more_bytes!(this, cx);
                    };
                    let line = &this.raw[this.raw_pos..nl];
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    let done = line.is_empty();
                    this.raw_pos = nl + 1;
                    if done {
                        this.state = ChunkState::Done;
                        return Poll::Ready(Ok(()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn address_parses_scheme_host_and_default_port() {
        let addr = UpstreamAddress::parse("http://127.0.0.1").unwrap();
        assert!(!addr.secure);
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 80);
        assert_eq!(addr.authority(), "127.0.0.1");
    }

    #[test]
    fn address_parses_explicit_port() {
        let addr = UpstreamAddress::parse("https://upstream.internal:9443").unwrap();
        assert!(addr.secure);
        assert_eq!(addr.port, 9443);
        assert_eq!(addr.authority(), "upstream.internal:9443");
    }

    #[test]
    fn address_rejects_unknown_scheme() {
        assert!(UpstreamAddress::parse("ftp://example.com").is_err());
    }

    #[tokio::test]
    async fn chunked_decoder_reassembles_payload() {
        let wire = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new(&wire[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"Wikipedia");
    }

    #[tokio::test]
    async fn chunked_decoder_skips_trailers() {
        let wire = b"3\r\nfoo\r\n0\r\nX-Trailer: yes\r\n\r\n";
        let mut decoder = ChunkedDecoder::new(&wire[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"foo");
    }

    #[tokio::test]
    async fn bounded_reader_stops_at_limit() {
        let mut reader = BoundedReader::new(&b"hello world"[..], 5);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }
}
