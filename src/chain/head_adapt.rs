//! HEAD→GET adaptation stage (§4.6).

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::{body::Body, request::Request},
    net::ConnectionInfo,
    Method,
};

/// Rewrites a `HEAD` request to `GET` before forwarding, then strips the
/// downstream body (preserving all headers, notably `Content-Length`) so the
/// response writer emits a headers-only reply.
pub struct HeadAdapt {
    next: SharedHandler,
}

impl HeadAdapt {
    pub fn new(next: SharedHandler) -> Self {
        Self { next }
    }
}

impl Handler for HeadAdapt {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let was_head = request.method() == Method::Head;
            if was_head {
                request.set_method(Method::Get);
            }

            let mut response = self.next.handle(info, request).await;

            if was_head {
                request.set_method(Method::Head);
                response.set_body(Body::Empty);
            }

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
    async fn head_request_drops_body_but_keeps_headers() {
        let inner: SharedHandler = Arc::new(move |_: &ConnectionInfo, req: &mut Request| -> HandlerFuture<'static> {
            assert_eq!(req.method(), Method::Get);
            Box::pin(async {
                Response::new(StatusCode::Ok)
                    .with_header("content-type", "text/plain")
                    .with_body(Body::bytes("hello"))
            })
        });
        let chain = HeadAdapt::new(inner);

        let mut req = test_request("HEAD /f HTTP/1.1\r\nHost: x\r\n\r\n");
        let info = conn_info();
        let resp = chain.handle(&info, &mut req).await;

        assert!(resp.body().is_empty());
        assert_eq!(resp.headers().get("content-type"), Some("text/plain"));
        assert_eq!(req.method(), Method::Head);
    }
}
