//! Redirect-rewriting stage (§4.12): rewrites the authority of
//! `Location`/`Content-Location`/`URI` response headers, used to make a
//! reverse-proxied upstream's self-referential redirects point back through
//! this server's own public authority instead of leaking the upstream's.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::request::Request,
    net::ConnectionInfo,
    StatusCode,
};

const REWRITTEN_HEADERS: &[&str] = &["location", "content-location", "uri"];

/// Status codes whose redirect-shaped headers are eligible for rewriting.
fn is_eligible(status: StatusCode) -> bool {
    matches!(status.as_u16(), 201 | 301 | 302 | 303 | 307 | 308)
}

pub struct RewriteRedirects {
    next: SharedHandler,
    /// `(from_authority, to_authority)` pairs, e.g. `("http://127.0.0.1:9000",
    /// "https://example.com")`, tried in order; the first matching prefix wins.
    rewrites: Vec<(String, String)>,
}

impl RewriteRedirects {
    pub fn new(next: SharedHandler, rewrites: Vec<(String, String)>) -> Self {
        Self { next, rewrites }
    }
}

impl Handler for RewriteRedirects {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let mut response = self.next.handle(info, request).await;

            if is_eligible(response.status()) {
                for name in REWRITTEN_HEADERS {
                    if let Some(rewritten) = response
                        .headers()
                        .get(name)
                        .and_then(|value| rewrite_authority(value, &self.rewrites))
                    {
                        response.headers_mut().insert(*name, rewritten);
                    }
                }
            }

            response
        })
    }
}

fn rewrite_authority(value: &str, rewrites: &[(String, String)]) -> Option<String> {
    for (from, to) in rewrites {
        if let Some(rest) = value.strip_prefix(from.as_str()) {
            return Some(format!("{to}{rest}"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint, Response};
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::Arc,
    };

    fn conn_info() -> ConnectionInfo {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        ConnectionInfo::new(ep, ep, false)
    }

    #[tokio::test]
    async fn rewrites_location_authority_on_eligible_status() {
        let inner: SharedHandler = Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async {
                Response::redirect(StatusCode::Found, "http://upstream.internal:9000/next")
            })
        });
        let chain = RewriteRedirects::new(
            inner,
            vec![("http://upstream.internal:9000".to_string(), "https://example.com".to_string())],
        );

        let mut req = test_request("GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;

        assert_eq!(resp.headers().get("location"), Some("https://example.com/next"));
    }

    #[tokio::test]
    async fn leaves_non_matching_authority_untouched() {
        let inner: SharedHandler = Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async { Response::redirect(StatusCode::Found, "https://elsewhere.example/next") })
        });
        let chain = RewriteRedirects::new(
            inner,
            vec![("http://upstream.internal:9000".to_string(), "https://example.com".to_string())],
        );

        let mut req = test_request("GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;

        assert_eq!(resp.headers().get("location"), Some("https://elsewhere.example/next"));
    }

    #[tokio::test]
    async fn leaves_non_eligible_status_untouched() {
        let inner: SharedHandler = Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async {
                Response::new(StatusCode::Ok).with_header("location", "http://upstream.internal:9000/next")
            })
        });
        let chain = RewriteRedirects::new(
            inner,
            vec![("http://upstream.internal:9000".to_string(), "https://example.com".to_string())],
        );

        let mut req = test_request("GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;

        assert_eq!(resp.headers().get("location"), Some("http://upstream.internal:9000/next"));
    }
}
