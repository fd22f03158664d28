//! Forward proxy terminal handler (§4.17): `CONNECT` tunneling and absolute-URL
//! passthrough, both gated by an optional host allowlist.

use crate::{
    chain::{Handler, HandlerFuture},
    errors::ErrorKind,
    http::{body::Body, request::Request},
    net::ConnectionInfo,
    routers::{
        reverse_proxy::{ReverseProxy, ReverseProxyConfig},
        upstream::UpstreamClient,
    },
    Method, Response, StatusCode,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::net::TcpStream;

/// Per-forward-proxy configuration (§10.4).
#[derive(Debug, Clone, Default)]
pub struct ForwardProxyConfig {
    /// When set, only these `host` or `host:port` entries may be dialed, by
    /// either `CONNECT` or absolute-URL passthrough. `None` allows any host.
    pub allowed_hosts: Option<Vec<String>>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl ForwardProxyConfig {
    fn allows(&self, authority: &str) -> bool {
        match &self.allowed_hosts {
            None => true,
            Some(hosts) => hosts.iter().any(|allowed| allowed == authority),
        }
    }
}

/// Handles `CONNECT` by tunneling and absolute-form requests by dispatching to
/// a memoized per-authority [`ReverseProxy`].
pub struct ForwardProxy {
    config: ForwardProxyConfig,
    client: Arc<dyn UpstreamClient>,
    proxies: Mutex<HashMap<String, Arc<ReverseProxy>>>,
}

impl ForwardProxy {
    pub fn new(config: ForwardProxyConfig) -> Self {
        Self {
            config,
            client: Arc::new(crate::routers::upstream::TcpUpstreamClient),
            proxies: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_client(config: ForwardProxyConfig, client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            config,
            client,
            proxies: Mutex::new(HashMap::new()),
        }
    }

    fn reverse_proxy_for(&self, base: &str) -> Result<Arc<ReverseProxy>, ErrorKind> {
        if let Some(existing) = self.proxies.lock().unwrap().get(base) {
            return Ok(Arc::clone(existing));
        }

        let proxy = Arc::new(ReverseProxy::with_client(
            base,
            ReverseProxyConfig::default(),
            Arc::clone(&self.client),
        )?);
        self.proxies.lock().unwrap().insert(base.to_owned(), Arc::clone(&proxy));
        Ok(proxy)
    }
}

impl Handler for ForwardProxy {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            if request.method() == Method::Connect {
                return self.handle_connect(request).await;
            }
            self.handle_absolute(info, request).await
        })
    }
}

impl ForwardProxy {
    async fn handle_connect(&self, request: &Request) -> Response {
        let Some(authority) = request.url().authority() else {
            return Response::status_only(StatusCode::BadRequest);
        };
        if !request.url().is_authority_form() {
            return Response::status_only(StatusCode::BadRequest);
        }
        if !self.config.allows(authority) {
            return Response::status_only(StatusCode::Forbidden);
        }

        let Some((host, port)) = authority.rsplit_once(':') else {
            return Response::status_only(StatusCode::BadRequest);
        };
        let Ok(port) = port.parse::<u16>() else {
            return Response::status_only(StatusCode::BadRequest);
        };

        match TcpStream::connect((host, port)).await {
            Ok(peer) => Response::status_only(StatusCode::Ok).with_body(Body::tunnel(peer)),
            Err(_) => Response::status_only(StatusCode::BadGateway),
        }
    }

    async fn handle_absolute(&self, info: &ConnectionInfo, request: &mut Request) -> Response {
        let Some(scheme) = request.url().scheme().map(str::to_owned) else {
            return Response::status_only(StatusCode::BadRequest);
        };
        if scheme != "http" {
            // https passthrough would require this proxy to terminate TLS on
            // behalf of the client, which it doesn't do; CONNECT is the only
            // route to an https origin.
            return Response::status_only(StatusCode::BadRequest);
        }
        let Some(authority) = request.url().authority().map(str::to_owned) else {
            return Response::status_only(StatusCode::BadRequest);
        };
        if !self.config.allows(&authority) {
            return Response::status_only(StatusCode::Forbidden);
        }

        let base = format!("{scheme}://{authority}");
        let proxy = match self.reverse_proxy_for(&base) {
            Ok(proxy) => proxy,
            Err(_) => return Response::status_only(StatusCode::BadGateway),
        };

        rewrite_to_origin_form(request);
        proxy.handle(info, request).await
    }
}

/// An absolute-form request-target carries the full origin; the reverse proxy
/// it's handed off to only understands origin-form, so the target is rewritten
/// to just the path-and-query before dispatch.
fn rewrite_to_origin_form(request: &mut Request) {
    let origin_form = request.url().clone().into_origin_form();
    *request.url_mut() = origin_form;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint, routers::upstream::{UpstreamFuture, UpstreamRequest, UpstreamResponse, UpstreamBody, UpstreamAddress}};
    use std::net::{IpAddr, Ipv4Addr};

    fn conn_info() -> ConnectionInfo {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), 8080);
        ConnectionInfo::new(ep, ep, false)
    }

    struct StubClient;
    impl UpstreamClient for StubClient {
        fn dispatch<'a>(
            &'a self,
            _address: &'a UpstreamAddress,
            request: UpstreamRequest<'a>,
            _stream_threshold: u64,
        ) -> UpstreamFuture<'a> {
            let target = request.target.to_owned();
            Box::pin(async move {
                let mut headers = crate::http::headers::HeaderMap::new();
                headers.insert("x-echo-target", target);
                Ok(UpstreamResponse {
                    status: 200,
                    headers,
                    body: UpstreamBody::Bytes(Vec::new()),
                })
            })
        }
    }

    #[tokio::test]
    async fn absolute_form_request_is_rewritten_to_origin_form_before_dispatch() {
        let proxy = ForwardProxy::with_client(ForwardProxyConfig::default(), Arc::new(StubClient));
        let mut req = test_request("GET http://upstream.example/a/b?x=1 HTTP/1.1\r\nHost: upstream.example\r\n\r\n");
        let info = conn_info();

        let resp = proxy.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(resp.headers().get("x-echo-target"), Some("/a/b?x=1"));
    }

    #[tokio::test]
    async fn absolute_form_https_is_rejected() {
        let proxy = ForwardProxy::with_client(ForwardProxyConfig::default(), Arc::new(StubClient));
        let mut req = test_request("GET https://upstream.example/a HTTP/1.1\r\n\r\n");
        let info = conn_info();
        let resp = proxy.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn denies_hosts_outside_the_allowlist() {
        let config = ForwardProxyConfig {
            allowed_hosts: Some(vec!["allowed.example".to_owned()]),
            _priv: (),
        };
        let proxy = ForwardProxy::with_client(config, Arc::new(StubClient));
        let mut req = test_request("GET http://denied.example/a HTTP/1.1\r\n\r\n");
        let info = conn_info();
        let resp = proxy.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn connect_rejects_a_non_authority_target() {
        let proxy = ForwardProxy::with_client(ForwardProxyConfig::default(), Arc::new(StubClient));
        let mut req = test_request("CONNECT /not-an-authority HTTP/1.1\r\n\r\n");
        let info = conn_info();
        let resp = proxy.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn connect_denies_hosts_outside_the_allowlist() {
        let config = ForwardProxyConfig {
            allowed_hosts: Some(vec!["allowed.example:443".to_owned()]),
            _priv: (),
        };
        let proxy = ForwardProxy::with_client(config, Arc::new(StubClient));
        let mut req = test_request("CONNECT denied.example:443 HTTP/1.1\r\n\r\n");
        let info = conn_info();
        let resp = proxy.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::Forbidden);
    }
}
