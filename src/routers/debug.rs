//! Debug router (§10.5): operational-inspection routes built on [`CodeRouter`].
//!
//! Not wired in by default; an integrator mounts it (typically behind
//! [`crate::chain::basic_auth::BasicAuth`]) when they want a reachable trigger
//! for the handler-exception-to-500 path and a quick look at what a connection
//! looks like from the server's side.

use crate::{
    chain::{Handler, HandlerFuture},
    http::request::Request,
    net::ConnectionInfo,
    routers::code_router::CodeRouter,
    Response,
};
use std::sync::Arc;

/// Builds the fixed three-route debug router: `/`, `/json`, `/error`.
pub struct DebugRouter;

impl DebugRouter {
    pub fn build() -> CodeRouter {
        CodeRouter::builder()
            .route("/", Arc::new(echo_html))
            .route("/json", Arc::new(echo_json))
            .route("/error", Arc::new(trigger_panic))
            .build()
    }
}

fn echo_html<'a>(info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
    Box::pin(async move {
        let mut rows = format!(
            "<tr><th>Remote address</th><td>{}</td></tr>\
             <tr><th>Method</th><td>{}</td></tr>\
             <tr><th>Path</th><td>{}</td></tr>\
             <tr><th>Query</th><td>{}</td></tr>",
            html_escape(&info.remote_endpoint.to_string()),
            request.method().as_str(),
            html_escape(request.url().path()),
            html_escape(request.url().query_full().unwrap_or("")),
        );
        for (name, value) in request.headers().iter() {
            rows.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>",
                html_escape(name),
                html_escape(value)
            ));
        }

        Response::html(format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Connection debug</title></head>\
             <body><table>{rows}</table></body></html>"
        ))
    })
}

fn echo_json<'a>(info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
    Box::pin(async move {
        let headers: Vec<String> = request
            .headers()
            .iter()
            .map(|(name, value)| format!("{{\"name\":{},\"value\":{}}}", json_string(name), json_string(value)))
            .collect();

        let body = format!(
            "{{\"remote_address\":{},\"method\":{},\"path\":{},\"query\":{},\"headers\":[{}]}}",
            json_string(&info.remote_endpoint.to_string()),
            json_string(request.method().as_str()),
            json_string(request.url().path()),
            json_string(request.url().query_full().unwrap_or("")),
            headers.join(","),
        );

        Response::json(body)
    })
}

fn trigger_panic<'a>(_info: &'a ConnectionInfo, _request: &'a mut Request) -> HandlerFuture<'a> {
    Box::pin(async move { panic!("/error: deliberate debug-router panic") })
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint};
    use std::net::{IpAddr, Ipv4Addr};

    fn conn_info() -> ConnectionInfo {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)), 9000);
        ConnectionInfo::new(ep, ep, false)
    }

    #[tokio::test]
    async fn root_echoes_request_info_as_html() {
        let router = DebugRouter::build();
        let mut req = test_request("GET /?q=1 HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), crate::StatusCode::Ok);
        let crate::http::body::Body::Bytes(data) = resp.body() else { panic!("expected bytes body") };
        let html = String::from_utf8(data.clone()).unwrap();
        assert!(html.contains("198.51.100.1:9000"));
    }

    #[tokio::test]
    async fn json_route_echoes_as_json() {
        let router = DebugRouter::build();
        let mut req = test_request("GET /json HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.headers().get("content-type"), Some("application/json"));
        let crate::http::body::Body::Bytes(data) = resp.body() else { panic!("expected bytes body") };
        let json = String::from_utf8(data.clone()).unwrap();
        assert!(json.contains("\"method\":\"GET\""));
    }

    #[tokio::test]
    #[should_panic(expected = "deliberate debug-router panic")]
    async fn error_route_panics() {
        let router = DebugRouter::build();
        let mut req = test_request("GET /error HTTP/1.1\r\nHost: x\r\n\r\n");
        router.handle(&conn_info(), &mut req).await;
    }
}
