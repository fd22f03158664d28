//! Code router terminal handler (§4.15): exact-match dispatch over a table of
//! handlers registered at construction time.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::request::Request,
    net::ConnectionInfo,
    Response, StatusCode,
};
use std::collections::HashMap;

/// Builds a [`CodeRouter`] via explicit `.route(path, handler)` calls — no
/// annotation or reflection-based route discovery.
pub struct CodeRouterBuilder {
    routes: HashMap<String, SharedHandler>,
    default_route: Option<SharedHandler>,
}

impl CodeRouterBuilder {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            default_route: None,
        }
    }

    pub fn route(mut self, path: impl Into<String>, handler: SharedHandler) -> Self {
        self.routes.insert(path.into(), handler);
        self
    }

    /// Handler invoked when no route matches the request path exactly
    /// (default: `404 Not Found`).
    pub fn default_route(mut self, handler: SharedHandler) -> Self {
        self.default_route = Some(handler);
        self
    }

    pub fn build(self) -> CodeRouter {
        CodeRouter {
            routes: self.routes,
            default_route: self.default_route,
        }
    }
}

impl Default for CodeRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CodeRouter {
    routes: HashMap<String, SharedHandler>,
    default_route: Option<SharedHandler>,
}

impl CodeRouter {
    pub fn builder() -> CodeRouterBuilder {
        CodeRouterBuilder::new()
    }
}

impl Handler for CodeRouter {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let path = request.url().path().to_owned();
            match self.routes.get(&path) {
                Some(handler) => handler.handle(info, request).await,
                None => match &self.default_route {
                    Some(handler) => handler.handle(info, request).await,
                    None => Response::status_only(StatusCode::NotFound),
                },
            }
        })
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

    fn ok_handler() -> SharedHandler {
        Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async { Response::status_only(StatusCode::Ok) })
        })
    }

    #[tokio::test]
    async fn dispatches_exact_match() {
        let router = CodeRouter::builder().route("/a", ok_handler()).build();
        let mut req = test_request("GET /a HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn falls_back_to_404_with_no_default_route() {
        let router = CodeRouter::builder().route("/a", ok_handler()).build();
        let mut req = test_request("GET /b HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn falls_back_to_configured_default_route() {
        let default: SharedHandler = Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async { Response::status_only(StatusCode::ImaTeapot) })
        });
        let router = CodeRouter::builder().default_route(default).build();
        let mut req = test_request("GET /anything HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::ImaTeapot);
    }
}
