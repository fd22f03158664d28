//! HTTPS enforcement stage (§4.11): redirects plaintext requests to the
//! equivalent `https://` URL and stamps HSTS on responses already served over
//! TLS.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::request::Request,
    net::ConnectionInfo,
    Response, StatusCode,
};

pub struct EnforceHttps {
    next: SharedHandler,
    hsts_max_age: u64,
}

impl EnforceHttps {
    pub fn new(next: SharedHandler, hsts_max_age: u64) -> Self {
        Self { next, hsts_max_age }
    }
}

impl Handler for EnforceHttps {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            if !info.secure {
                if let Some(host) = request.header("host") {
                    let location = format!("https://{host}{}", request.url().target());
                    let mut redirect = Response::redirect(StatusCode::MovedPermanently, location);
                    redirect
                        .headers_mut()
                        .insert_if_absent("strict-transport-security", format!("max-age={}", self.hsts_max_age));
                    return redirect;
                }
                // Host unknown: nothing to redirect to, pass through unchanged.
            }

            let mut response = self.next.handle(info, request).await;
            response
                .headers_mut()
                .insert_if_absent("strict-transport-security", format!("max-age={}", self.hsts_max_age));
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint, Response as Resp};
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::Arc,
    };

    fn endpoint() -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080)
    }

    fn inner_ok() -> SharedHandler {
        Arc::new(move |_: &ConnectionInfo, _: &mut Request| -> HandlerFuture<'static> {
            Box::pin(async { Resp::new(StatusCode::Ok) })
        })
    }

    #[tokio::test]
    async fn redirects_plaintext_requests() {
        let chain = EnforceHttps::new(inner_ok(), 31_536_000);
        let info = ConnectionInfo::new(endpoint(), endpoint(), false);
        let mut req = test_request("GET /a?b=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");

        let resp = chain.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::MovedPermanently);
        assert_eq!(resp.headers().get("location"), Some("https://example.com/a?b=1"));
        assert_eq!(resp.headers().get("strict-transport-security"), Some("max-age=31536000"));
    }

    #[tokio::test]
    async fn passes_through_when_host_is_absent() {
        let chain = EnforceHttps::new(inner_ok(), 31_536_000);
        let info = ConnectionInfo::new(endpoint(), endpoint(), false);
        let mut req = test_request("GET /a HTTP/1.1\r\n\r\n");

        let resp = chain.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn stamps_hsts_on_secure_connections() {
        let chain = EnforceHttps::new(inner_ok(), 31_536_000);
        let info = ConnectionInfo::new(endpoint(), endpoint(), true);
        let mut req = test_request("GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");

        let resp = chain.handle(&info, &mut req).await;
        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(
            resp.headers().get("strict-transport-security"),
            Some("max-age=31536000")
        );
    }
}
