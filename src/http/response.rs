//! The response type (C6 writer + C7 factory): status, headers, and a body
//! variant, plus the wire serializer that writes it to a connection socket.

use crate::{
    http::{body::Body, headers::HeaderMap, types::Version},
    net::ConnectionSocket,
};
use std::io;
use tokio::io::AsyncWriteExt;

/// A response in progress: produced by a terminal handler, mutated by chain
/// stages in the post-handler direction, finally serialized by [`write`].
#[derive(Debug)]
pub struct Response {
    pub(crate) status: crate::StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
}

impl Response {
    pub fn new(status: crate::StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn status(&self) -> crate::StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: crate::StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

// Factory constructors (C7).
impl Response {
    /// `200 OK` with a `text/plain; charset=utf-8` body.
    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        Self::new(crate::StatusCode::Ok)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(Body::bytes(body))
    }

    /// `200 OK` with a `text/html; charset=utf-8` body.
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::new(crate::StatusCode::Ok)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(Body::bytes(body))
    }

    /// `200 OK` with an `application/json` body. `body` must already be
    /// serialized; this crate does not pull in a JSON serialization crate for
    /// a response factory that is otherwise a thin convenience wrapper.
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self::new(crate::StatusCode::Ok)
            .with_header("content-type", "application/json")
            .with_body(Body::bytes(body))
    }

    /// A bare status with no body, e.g. for 204/304/4xx/5xx short-circuits.
    pub fn status_only(status: crate::StatusCode) -> Self {
        Self::new(status)
    }

    /// A redirect: sets `Location` and an empty body. `status` should be one of
    /// the redirect codes (`301`, `302`, `303`, `307`, `308`).
    pub fn redirect(status: crate::StatusCode, location: impl Into<String>) -> Self {
        Self::new(status).with_header("location", location)
    }
}

/// Serializes `response` to `socket` as one complete HTTP/1.x message, then
/// flushes once for low time-to-first-byte (per [`ConnectionSocket::cork_flush`]).
///
/// Body variants dictate framing: `Bytes`/`File` emit `Content-Length`; `Stream`
/// emits `Transfer-Encoding: chunked` and its own chunk framing; `Empty` and
/// `Tunnel` emit neither. After the status line and blank line, a `Tunnel`
/// splices the two sockets bidirectionally until either closes.
pub async fn write(
    response: &mut Response,
    socket: &mut ConnectionSocket,
    version: Version,
) -> io::Result<()> {
    let body = response.body.take();

    match &body {
        Body::Empty => {
            response.headers.remove("content-length");
        }
        Body::Bytes(data) => {
            response.headers.insert("content-length", data.len().to_string());
        }
        Body::File { len, .. } => {
            response.headers.insert("content-length", len.to_string());
        }
        Body::Stream { .. } => {
            response.headers.remove("content-length");
            response.headers.insert("transfer-encoding", "chunked");
        }
        Body::Tunnel(_) => {
            response.headers.remove("content-length");
            response.headers.remove("transfer-encoding");
        }
    }

    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(response.status.into_first_line(version));
    for (name, value) in response.headers.iter() {
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    socket.send_all(&head).await?;

    match body {
        Body::Empty => {}
        Body::Bytes(data) => socket.send_all(&data).await?,
        Body::File { path, len } => {
            let mut file = tokio::fs::File::open(&path).await?;
            socket.send_file(&mut file, len).await?;
        }
        Body::Stream { source, chunk_size } => {
            write_chunked(socket, source, chunk_size).await?;
        }
        Body::Tunnel(peer) => {
            let mut peer = peer;
            tokio::io::copy_bidirectional(socket, &mut peer).await?;
        }
    }

    socket.cork_flush()?;
    Ok(())
}

async fn write_chunked(
    socket: &mut ConnectionSocket,
    mut source: crate::http::body::BoxedReader,
    chunk_size: usize,
) -> io::Result<()> {
    use tokio::io::AsyncReadExt;

    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        socket.send_all(format!("{n:x}\r\n").as_bytes()).await?;
        socket.send_all(&buf[..n]).await?;
        socket.send_all(b"\r\n").await?;
    }
    socket.send_all(b"0\r\n\r\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_set_expected_status_and_headers() {
        let r = Response::html("<p>hi</p>");
        assert_eq!(r.status(), crate::StatusCode::Ok);
        assert_eq!(r.headers().get("content-type"), Some("text/html; charset=utf-8"));

        let r = Response::redirect(crate::StatusCode::Found, "https://example.com/");
        assert_eq!(r.status(), crate::StatusCode::Found);
        assert_eq!(r.headers().get("location"), Some("https://example.com/"));
    }

    #[test]
    fn with_header_overwrites_single_valued() {
        let r = Response::text("hi").with_header("content-type", "application/octet-stream");
        assert_eq!(r.headers().get("content-type"), Some("application/octet-stream"));
    }
}
