//! Reverse proxy terminal handler (§4.16): forwards to a single configured
//! upstream, rewriting forwarding headers and re-synthesizing the response.

use crate::{
    chain::{Handler, HandlerFuture},
    errors::ErrorKind,
    http::{body::Body, request::Request},
    net::ConnectionInfo,
    routers::upstream::{UpstreamAddress, UpstreamBody, UpstreamClient, UpstreamRequest, UpstreamResponse},
    Response, StatusCode,
};
use std::sync::Arc;

const HOP_BY_HOP_REQUEST: &[&str] = &["connection", "te"];
const HOP_BY_HOP_RESPONSE: &[&str] = &["connection", "transfer-encoding"];

/// Per-reverse-proxy configuration (§10.3).
#[derive(Debug, Clone)]
pub struct ReverseProxyConfig {
    /// Append `X-Forwarded-For`/`-Host`/`-Proto` and a `Forwarded` segment.
    pub set_proxy_headers: bool,
    /// Keep the inbound `Host` header instead of dropping it (upstream then sees
    /// the original client-facing hostname rather than its own).
    pub preserve_host: bool,
    /// Allow the upstream client to decode `Content-Encoding` (unset: pass through
    /// whatever encoding the upstream used, unexamined).
    pub decode_content: bool,
    /// Responses at or below this many bytes are materialized as `Bytes`; larger
    /// ones (and anything chunked, regardless of size) are streamed.
    pub stream_threshold: u64,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReverseProxyConfig {
    fn default() -> Self {
        Self {
            set_proxy_headers: true,
            preserve_host: false,
            decode_content: false,
            stream_threshold: 1024 * 1024,
            _priv: (),
        }
    }
}

pub struct ReverseProxy {
    address: UpstreamAddress,
    config: ReverseProxyConfig,
    client: Arc<dyn UpstreamClient>,
}

impl ReverseProxy {
    /// `upstream` is a base URL of the form `http://host[:port]` (see
    /// [`UpstreamAddress::parse`]).
    pub fn new(upstream: &str, config: ReverseProxyConfig) -> Result<Self, ErrorKind> {
        Ok(Self {
            address: UpstreamAddress::parse(upstream)?,
            config,
            client: Arc::new(crate::routers::upstream::TcpUpstreamClient),
        })
    }

    /// Same as [`Self::new`] but with a caller-supplied [`UpstreamClient`], for
    /// tests or for swapping in a TLS-capable client.
    pub fn with_client(upstream: &str, config: ReverseProxyConfig, client: Arc<dyn UpstreamClient>) -> Result<Self, ErrorKind> {
        Ok(Self {
            address: UpstreamAddress::parse(upstream)?,
            config,
            client,
        })
    }
}

impl Handler for ReverseProxy {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let target = request.url().target();
            let headers = preprocess(request, info, &self.config, &self.address);

            let upstream_request = UpstreamRequest {
                method: request.method(),
                target: &target,
                headers: &headers,
                body: request.body(),
            };

            match self
                .client
                .dispatch(&self.address, upstream_request, self.config.stream_threshold)
                .await
            {
                Ok(upstream_response) => synthesize(upstream_response, self.config.decode_content),
                Err(_) => Response::status_only(StatusCode::BadGateway),
            }
        })
    }
}

fn preprocess(
    request: &Request,
    info: &ConnectionInfo,
    config: &ReverseProxyConfig,
    address: &UpstreamAddress,
) -> crate::http::headers::HeaderMap {
    let mut headers = request.headers().clone();
    for name in HOP_BY_HOP_REQUEST {
        headers.remove(name);
    }

    if config.set_proxy_headers {
        let remote_ip = info.remote_endpoint.ip().to_string();
        let existing_for = headers.get("x-forwarded-for").map(str::to_owned);
        let forwarded_for = match existing_for {
            Some(prior) => format!("{prior}, {remote_ip}"),
            None => remote_ip.clone(),
        };
        headers.insert("x-forwarded-for", forwarded_for);

        if let Some(host) = request.header("host") {
            headers.insert("x-forwarded-host", host.to_owned());
        }
        let proto = if info.secure { "https" } else { "http" };
        headers.insert("x-forwarded-proto", proto);

        let segment = format!(
            "by={};for={};host={};proto={}",
            address.authority(),
            remote_ip,
            request.header("host").unwrap_or(""),
            proto
        );
        match headers.get("forwarded").map(str::to_owned) {
            Some(prior) => headers.insert("forwarded", format!("{prior}, {segment}")),
            None => headers.insert("forwarded", segment),
        }
    }

    if !config.preserve_host {
        headers.remove("host");
        headers.insert("host", address.authority());
    }

    headers
}

fn synthesize(upstream: UpstreamResponse, decode_content: bool) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BadGateway);
    let mut response = Response::new(status);

    for (name, value) in upstream.headers.iter() {
        if HOP_BY_HOP_RESPONSE.iter().any(|hop| name.eq_ignore_ascii_case(hop)) {
            continue;
        }
        if !decode_content && name.eq_ignore_ascii_case("content-encoding") {
            response.headers_mut().insert(name, value);
            continue;
        }
        response.headers_mut().append(name, value);
    }

    response.set_body(match upstream.body {
        UpstreamBody::Bytes(data) => Body::bytes(data),
        UpstreamBody::Stream(source) => Body::stream(source),
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint, routers::upstream::UpstreamFuture};
    use std::net::{IpAddr, Ipv4Addr};

    fn conn_info() -> ConnectionInfo {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)), 443);
        ConnectionInfo::new(ep, ep, true)
    }

    struct StubClient;

    impl UpstreamClient for StubClient {
        fn dispatch<'a>(
            &'a self,
            _address: &'a UpstreamAddress,
            request: UpstreamRequest<'a>,
            _stream_threshold: u64,
        ) -> UpstreamFuture<'a> {
            let forwarded_for = request.headers.get("x-forwarded-for").map(str::to_owned);
            Box::pin(async move {
                let mut headers = crate::http::headers::HeaderMap::new();
                headers.insert("content-type", "text/plain");
                if let Some(seen) = forwarded_for {
                    headers.insert("x-echo-forwarded-for", seen);
                }
                Ok(UpstreamResponse {
                    status: 200,
                    headers,
                    body: UpstreamBody::Bytes(b"hi from upstream".to_vec()),
                })
            })
        }
    }

    #[tokio::test]
    async fn forwards_and_sets_proxy_headers() {
        let proxy = ReverseProxy::with_client(
            "http://upstream.internal:9000",
            ReverseProxyConfig::default(),
            Arc::new(StubClient),
        )
        .unwrap();

        let mut req = test_request("GET /a HTTP/1.1\r\nHost: public.example\r\n\r\n");
        let info = conn_info();
        let resp = proxy.handle(&info, &mut req).await;

        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(resp.headers().get("x-echo-forwarded-for"), Some("203.0.113.9"));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_bad_gateway() {
        struct FailingClient;
        impl UpstreamClient for FailingClient {
            fn dispatch<'a>(
                &'a self,
                _address: &'a UpstreamAddress,
                _request: UpstreamRequest<'a>,
                _stream_threshold: u64,
            ) -> UpstreamFuture<'a> {
                Box::pin(async { Err(ErrorKind::UpstreamError) })
            }
        }

        let proxy = ReverseProxy::with_client(
            "http://upstream.internal:9000",
            ReverseProxyConfig::default(),
            Arc::new(FailingClient),
        )
        .unwrap();

        let mut req = test_request("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let info = conn_info();
        let resp = proxy.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::BadGateway);
    }
}
