//! Default-headers stage (§4.5): ensures `Server` and `Date` are present on
//! the downstream response without overwriting values the handler already set.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::request::Request,
    net::ConnectionInfo,
};

/// Wraps `next`, stamping `Server: <product>` and `Date: <HTTP-date>` on its
/// response whenever those headers are absent.
pub struct DefaultHeaders {
    next: SharedHandler,
    product: String,
}

impl DefaultHeaders {
    pub fn new(next: SharedHandler, product: impl Into<String>) -> Self {
        Self {
            next,
            product: product.into(),
        }
    }
}

impl Handler for DefaultHeaders {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let mut response = self.next.handle(info, request).await;
            response.headers_mut().insert_if_absent("server", &self.product);
            response
                .headers_mut()
                .insert_if_absent("date", httpdate::fmt_http_date(std::time::SystemTime::now()));
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint, Response, StatusCode};
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::Arc,
    };

    fn conn_info() -> ConnectionInfo {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        ConnectionInfo::new(ep, ep, false)
    }

    #[tokio::test]
    async fn stamps_server_and_date_when_absent() {
        let inner: SharedHandler =
            Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
                Box::pin(async { Response::new(StatusCode::Ok) })
            });
        let chain = DefaultHeaders::new(inner, "origin_web");

        let mut req = test_request("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;

        assert_eq!(resp.headers().get("server"), Some("origin_web"));
        assert!(resp.headers().get("date").is_some());
    }

    #[tokio::test]
    async fn does_not_overwrite_existing_values() {
        let inner: SharedHandler = Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async {
                Response::new(StatusCode::Ok).with_header("server", "custom")
            })
        });
        let chain = DefaultHeaders::new(inner, "origin_web");

        let mut req = test_request("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;

        assert_eq!(resp.headers().get("server"), Some("custom"));
    }
}
