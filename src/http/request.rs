//! The request parser (C4): reads one HTTP/1.x request message off a connection
//! socket into a [`Request`].

use crate::{
    errors::ErrorKind,
    http::headers::HeaderMap,
    limits::ReqLimits,
    net::ConnectionSocket,
    Method, Url, Version,
};
use memchr::memmem;

/// A fully parsed HTTP/1.x request.
///
/// Mutable by chain stages in the pre-handler direction (HEAD→GET rewrites
/// `method`, virtual hosting and rewrite stages may rewrite `url`).
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Vec<u8>,
}

impl Request {
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Rewrites the method in place. Used by the HEAD→GET adaptation stage.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub const fn url(&self) -> &Url {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    pub const fn version(&self) -> Version {
        self.version
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }
}

/// Reads and parses request messages off one connection's byte stream.
///
/// Holds only a scratch read buffer; a fresh [`Request`] is produced per call to
/// [`Parser::read_request`], so there is nothing to reset between keep-alive turns
/// beyond dropping whatever bytes of the next request were already buffered ahead.
pub struct Parser {
    buf: Vec<u8>,
    /// Bytes in `buf` already consumed by a prior request on this connection
    /// (pipelined reads past the header terminator are rare but legal to arrive).
    consumed: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            consumed: 0,
        }
    }

    /// Reads exactly one request message. Returns `Ok(None)` when the peer closed
    /// before sending any bytes for a new request (a clean keep-alive end, not an
    /// error — the caller maps it to a quiet loop exit rather than 4xx).
    pub async fn read_request(
        &mut self,
        socket: &mut ConnectionSocket,
        limits: &ReqLimits,
    ) -> Result<Option<Request>, ErrorKind> {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.consumed = 0;
        }

        let header_end = loop {
            if let Some(pos) = memmem::find(&self.buf, b"\r\n\r\n") {
                break pos + 4;
            }
            if self.buf.len() > limits.header_block_size {
                return Err(ErrorKind::TooManyHeaders);
            }

            let mut chunk = [0u8; 8192];
            let n = socket.recv(&mut chunk).await.map_err(ErrorKind::from)?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(ErrorKind::GracefulDisconnect)
                };
            }
            self.buf.extend_from_slice(&chunk[..n]);
        };

        let head = &self.buf[..header_end - 2]; // drop trailing blank line's CRLF
        let (method, url, version, headers) = parse_head(head, limits)?;

        let content_length = content_length_of(&headers)?;
        self.consumed = header_end;

        let body = if let Some(len) = content_length {
            if len > limits.body_size {
                return Err(ErrorKind::BodyTooLarge);
            }
            self.read_body(socket, len).await?
        } else {
            Vec::new()
        };

        Ok(Some(Request {
            method,
            url,
            version,
            headers,
            body,
        }))
    }

    async fn read_body(
        &mut self,
        socket: &mut ConnectionSocket,
        len: usize,
    ) -> Result<Vec<u8>, ErrorKind> {
        let available = self.buf.len() - self.consumed;

        if available >= len {
            let body = self.buf[self.consumed..self.consumed + len].to_vec();
            self.consumed += len;
            return Ok(body);
        }

        let mut body = Vec::with_capacity(len);
        body.extend_from_slice(&self.buf[self.consumed..]);
        self.consumed = self.buf.len();

        while body.len() < len {
            let mut chunk = vec![0u8; (len - body.len()).min(64 * 1024)];
            let n = socket.recv(&mut chunk).await.map_err(ErrorKind::from)?;
            if n == 0 {
                return Err(ErrorKind::BodyMismatch {
                    expected: len,
                    available: body.len(),
                });
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Ok(body)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_head(
    head: &[u8],
    limits: &ReqLimits,
) -> Result<(Method, Url, Version, HeaderMap), ErrorKind> {
    let mut lines = head.split(|&b| b == b'\n');
    let request_line = lines.next().ok_or(ErrorKind::InvalidMethod)?;
    let request_line = request_line
        .strip_suffix(b"\r")
        .unwrap_or(request_line);

    let (method, consumed) = Method::from_bytes(request_line)?;
    let rest = &request_line[consumed..];

    let space = memchr::memchr(b' ', rest).ok_or(ErrorKind::InvalidUrl)?;
    let target = &rest[..space];
    if target.len() > limits.url_size {
        return Err(ErrorKind::InvalidUrl);
    }
    if !target.is_ascii() {
        return Err(ErrorKind::InvalidUrl);
    }
    let target = std::str::from_utf8(target).map_err(|_| ErrorKind::InvalidUrl)?;
    let url = Url::parse(target)?;

    let version_bytes = &rest[space + 1..];
    let (version, _) = Version::from_bytes(version_bytes)?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if headers.len() >= limits.header_count {
            return Err(ErrorKind::TooManyHeaders);
        }

        let colon = memchr::memchr(b':', line).ok_or(ErrorKind::InvalidHeader)?;
        let name = &line[..colon];
        if name.len() > limits.header_name_size || !name.is_ascii() {
            return Err(ErrorKind::InvalidHeader);
        }
        let value = trim_ascii(&line[colon + 1..]);
        if value.len() > limits.header_value_size || !value.is_ascii() {
            return Err(ErrorKind::InvalidHeader);
        }

        let name = std::str::from_utf8(name).map_err(|_| ErrorKind::InvalidHeader)?;
        let value = std::str::from_utf8(value).map_err(|_| ErrorKind::InvalidHeader)?;
        headers.append(name, value);
    }

    Ok((method, url, version, headers))
}

fn content_length_of(headers: &HeaderMap) -> Result<Option<usize>, ErrorKind> {
    match headers.get("content-length") {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ErrorKind::InvalidContentLength),
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}

/// Builds a [`Request`] directly from a raw head (request-line + headers, no
/// body) for use in tests elsewhere in the crate that need a `Request` to
/// hand to a chain stage without driving a real socket.
#[cfg(test)]
pub(crate) fn test_request(head: &str) -> Request {
    let (method, url, version, headers) = parse_head(head.as_bytes(), &ReqLimits::default())
        .expect("test_request: head must parse");
    Request {
        method,
        url,
        version,
        headers,
        body: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ReqLimits;

    fn parse(head: &str) -> Result<(Method, Url, Version, HeaderMap), ErrorKind> {
        parse_head(head.as_bytes(), &ReqLimits::default())
    }

    #[test]
    fn parses_simple_get() {
        let (method, url, version, headers) =
            parse("GET /hello HTTP/1.1\r\nHost: example.com\r\n").unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(url.path(), "/hello");
        assert_eq!(version, Version::Http11);
        assert_eq!(headers.get("host"), Some("example.com"));
    }

    #[test]
    fn rejects_bad_version() {
        assert!(parse("GET / HTTP/2.0\r\n").is_err());
    }

    #[test]
    fn rejects_header_without_colon() {
        assert!(parse("GET / HTTP/1.1\r\nmalformed-header\r\n").is_err());
    }

    #[test]
    fn preserves_header_casing_on_emission_but_matches_case_insensitively() {
        let (_, _, _, headers) = parse("GET / HTTP/1.1\r\nX-Custom-Header: Value\r\n").unwrap();
        assert_eq!(headers.get("x-custom-header"), Some("Value"));
        assert_eq!(headers.iter().next().unwrap().0, "X-Custom-Header");
    }

    #[test]
    fn content_length_parses_decimal() {
        let headers = {
            let mut h = HeaderMap::new();
            h.insert("Content-Length", "42");
            h
        };
        assert_eq!(content_length_of(&headers).unwrap(), Some(42));
    }

    #[test]
    fn content_length_rejects_non_numeric() {
        let headers = {
            let mut h = HeaderMap::new();
            h.insert("Content-Length", "not-a-number");
            h
        };
        assert!(content_length_of(&headers).is_err());
    }
}
