//! Precondition evaluator (§4.7, RFC 9110 §13): evaluated after the downstream
//! handler produces a candidate response, using the candidate's `ETag` and
//! `Last-Modified` against the request's conditional headers.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::{body::Body, request::Request},
    net::ConnectionInfo,
    Method, Response, StatusCode,
};
/// Headers preserved on a 304/412 short-circuit: validators and cache-control
/// metadata, per RFC 9110 §15.4.5. Everything describing the dropped body
/// (`Content-Type`, `Content-Length`, etc.) is left behind.
const CACHEABLE_HEADERS: &[&str] = &["etag", "last-modified", "cache-control", "expires", "vary", "content-location"];

pub struct Precondition {
    next: SharedHandler,
}

impl Precondition {
    pub fn new(next: SharedHandler) -> Self {
        Self { next }
    }
}

impl Handler for Precondition {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let method = request.method();
            let candidate = self.next.handle(info, request).await;
            evaluate(request, method, candidate)
        })
    }
}

fn evaluate(request: &Request, method: Method, candidate: Response) -> Response {
    let etag = candidate.headers().get("etag").map(str::to_owned);
    let last_modified = candidate
        .headers()
        .get("last-modified")
        .and_then(|v| httpdate::parse_http_date(v).ok());

    if let Some(if_match) = request.header("if-match") {
        if !if_match_satisfied(if_match, etag.as_deref()) {
            return short_circuit(candidate, StatusCode::PreconditionFailed);
        }
    } else if let (Some(if_unmodified_since), Some(last_modified)) =
        (request.header("if-unmodified-since"), last_modified)
    {
        if let Ok(threshold) = httpdate::parse_http_date(if_unmodified_since) {
            if last_modified > threshold {
                return short_circuit(candidate, StatusCode::PreconditionFailed);
            }
        }
    }

    if let Some(if_none_match) = request.header("if-none-match") {
        if if_none_match_matches(if_none_match, etag.as_deref()) {
            let status = if matches!(method, Method::Get | Method::Head) {
                StatusCode::NotModified
            } else {
                StatusCode::PreconditionFailed
            };
            return short_circuit(candidate, status);
        }
    } else if let Some(if_modified_since) = request.header("if-modified-since") {
        if matches!(method, Method::Get | Method::Head) {
            if let (Ok(threshold), Some(last_modified)) =
                (httpdate::parse_http_date(if_modified_since), last_modified)
            {
                if last_modified <= threshold {
                    return short_circuit(candidate, StatusCode::NotModified);
                }
            }
        }
    }

    candidate
}

fn short_circuit(candidate: Response, status: StatusCode) -> Response {
    let mut response = Response::new(status);
    for name in CACHEABLE_HEADERS {
        if let Some(value) = candidate.headers().get(name) {
            response.headers_mut().insert(*name, value);
        }
    }
    response.set_body(Body::Empty);
    response
}

/// Per RFC 9110 §13.1.1: `If-Match` uses strong comparison; a weak ETag never
/// satisfies it even if equal. A literal `*` is satisfied by any representation.
fn if_match_satisfied(if_match: &str, etag: Option<&str>) -> bool {
    if if_match.trim() == "*" {
        return etag.is_some();
    }
    let Some(etag) = etag else { return false };
    if is_weak(etag) {
        return false;
    }
    if_match.split(',').map(str::trim).any(|candidate| strong_equal(candidate, etag))
}

/// Per RFC 9110 §13.1.2: `If-None-Match` uses weak comparison. A literal `*`
/// matches any existing representation.
fn if_none_match_matches(if_none_match: &str, etag: Option<&str>) -> bool {
    if if_none_match.trim() == "*" {
        return etag.is_some();
    }
    let Some(etag) = etag else { return false };
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| weak_equal(candidate, etag))
}

fn is_weak(etag: &str) -> bool {
    etag.starts_with("W/")
}

fn opaque_tag(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}

fn strong_equal(a: &str, b: &str) -> bool {
    !is_weak(a) && !is_weak(b) && a == b
}

fn weak_equal(a: &str, b: &str) -> bool {
    opaque_tag(a) == opaque_tag(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::test_request;

    #[test]
    fn if_match_wildcard_satisfied_when_representation_exists() {
        assert!(if_match_satisfied("*", Some("\"abc\"")));
        assert!(!if_match_satisfied("*", None));
    }

    #[test]
    fn if_match_rejects_weak_etag() {
        assert!(!if_match_satisfied("W/\"abc\"", Some("W/\"abc\"")));
    }

    #[test]
    fn if_none_match_weak_comparison_ignores_weak_prefix() {
        assert!(if_none_match_matches("W/\"abc\"", Some("\"abc\"")));
        assert!(if_none_match_matches("\"abc\"", Some("W/\"abc\"")));
    }

    #[test]
    fn not_modified_preserves_etag_and_drops_body() {
        let mut candidate = Response::new(StatusCode::Ok)
            .with_header("etag", "\"abc\"")
            .with_header("content-type", "text/plain");
        candidate.set_body(Body::bytes("hello"));

        let request = test_request("GET /f HTTP/1.1\r\nHost: x\r\nIf-None-Match: \"abc\"\r\n\r\n");
        let response = evaluate(&request, Method::Get, candidate);

        assert_eq!(response.status(), StatusCode::NotModified);
        assert_eq!(response.headers().get("etag"), Some("\"abc\""));
        assert_eq!(response.headers().get("content-type"), None);
        assert!(response.body().is_empty());
    }
}
