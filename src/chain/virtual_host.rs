//! Virtual-host dispatch stage (§4.10): routes on the request's `Host` header
//! to a per-host handler, falling back to a configured default when the host
//! is absent or unrecognized.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::request::Request,
    net::ConnectionInfo,
    Response, StatusCode,
};
use std::collections::HashMap;

/// Dispatches by `Host` header (port stripped) to one of several assembled
/// chains. Built once at startup via [`VirtualHostBuilder`] and shared
/// read-only thereafter, same as every other stage.
pub struct VirtualHost {
    hosts: HashMap<String, SharedHandler>,
    default: Option<SharedHandler>,
}

impl VirtualHost {
    pub fn builder() -> VirtualHostBuilder {
        VirtualHostBuilder::new()
    }
}

impl Handler for VirtualHost {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let host = request
                .header("host")
                .map(|h| strip_port(h).to_ascii_lowercase());

            let target = host
                .and_then(|h| self.hosts.get(&h))
                .or(self.default.as_ref());

            match target {
                Some(handler) => handler.handle(info, request).await,
                None => Response::new(StatusCode::NotFound),
            }
        })
    }
}

/// Strips an optional trailing `:<port>` from a `Host` header value. Leaves
/// bracketed IPv6 literals (`[::1]:8080`) intact up to the closing bracket.
fn strip_port(host: &str) -> &str {
    if let Some(bracket_end) = host.rfind(']') {
        return &host[..=bracket_end];
    }
    match host.rfind(':') {
        Some(idx) => &host[..idx],
        None => host,
    }
}

pub struct VirtualHostBuilder {
    hosts: HashMap<String, SharedHandler>,
    default: Option<SharedHandler>,
}

impl VirtualHostBuilder {
    pub fn new() -> Self {
        Self {
            hosts: HashMap::new(),
            default: None,
        }
    }

    pub fn host(mut self, name: impl Into<String>, handler: SharedHandler) -> Self {
        self.hosts.insert(name.into().to_ascii_lowercase(), handler);
        self
    }

    pub fn default_host(mut self, handler: SharedHandler) -> Self {
        self.default = Some(handler);
        self
    }

    pub fn build(self) -> VirtualHost {
        VirtualHost {
            hosts: self.hosts,
            default: self.default,
        }
    }
}

impl Default for VirtualHostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint};
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::Arc,
    };

    fn conn_info() -> ConnectionInfo {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        ConnectionInfo::new(ep, ep, false)
    }

    fn handler_returning(status: StatusCode) -> SharedHandler {
        Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async move { Response::new(status) })
        })
    }

    #[test]
    fn strips_trailing_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }

    #[tokio::test]
    async fn dispatches_to_matching_host_case_insensitively() {
        let chain = VirtualHost::builder()
            .host("example.com", handler_returning(StatusCode::Ok))
            .default_host(handler_returning(StatusCode::NotFound))
            .build();

        let mut req = test_request("GET / HTTP/1.1\r\nHost: EXAMPLE.com:443\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn falls_back_to_default_for_unknown_host() {
        let chain = VirtualHost::builder()
            .host("example.com", handler_returning(StatusCode::Ok))
            .default_host(handler_returning(StatusCode::NotFound))
            .build();

        let mut req = test_request("GET / HTTP/1.1\r\nHost: other.com\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::NotFound);
    }
}
