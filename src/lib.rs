//! origin_web - a security-first, from-scratch HTTP/1.x origin server built
//! around a composable handler chain.
//!
//! # Protocol support
//!
//! - **HTTP/1.1**: full protocol support, persistent connections, chunked
//!   transfer encoding on responses.
//! - **HTTP/1.0**: basic protocol support for legacy clients.
//! - **TLS**: via [`rustls`](https://docs.rs/rustls), loaded from an
//!   already-resident PEM certificate/key pair.
//!
//! # Shape of the crate
//!
//! A connection is handed to a [`chain::Handler`]: an ownership tree of
//! middleware stages (default headers, compression, minification, virtual
//! hosting, HTTPS enforcement, redirect rewriting, Basic auth, conditional
//! requests, `HEAD`→`GET` adaptation — see [`chain`]) terminating in one of
//! the [`routers`] (static files, a small code-driven router, a reverse
//! proxy, or a forward/`CONNECT` proxy). [`server::supervisor`] binds the
//! configured listeners and runs them until interrupted.
//!
//! # Quick start
//!
//! ```no_run
//! use origin_web::{
//!     chain::{default_headers::DefaultHeaders, HandlerFuture, SharedHandler},
//!     net::{ConnectionInfo, Endpoint},
//!     routers::CodeRouter,
//!     server::supervisor::{self, ServerConfig},
//!     Body, Request, Response, StatusCode,
//! };
//! use std::sync::Arc;
//!
//! fn hello<'a>(_info: &'a ConnectionInfo, _request: &'a mut Request) -> HandlerFuture<'a> {
//!     Box::pin(async { Response::new(StatusCode::Ok).with_body(Body::bytes("Hello, world!")) })
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let router: SharedHandler = Arc::new(CodeRouter::builder().route("/", Arc::new(hello)).build());
//!     let chain: SharedHandler = Arc::new(DefaultHeaders::new(router, "origin_web"));
//!
//!     let config = ServerConfig {
//!         handler_chain: chain,
//!         http_listeners: vec![Endpoint::parse("127.0.0.1:8080").unwrap()],
//!         ..Default::default()
//!     };
//!     supervisor::run(config).await;
//! }
//! ```

pub mod chain;
pub mod errors;
pub mod limits;
pub mod mime;
pub mod net;
pub mod routers;

pub mod server {
    pub(crate) mod connection;
    pub mod listener;
    pub mod supervisor;
}

pub(crate) mod http {
    pub mod body;
    pub mod headers;
    pub mod request;
    pub mod response;
    pub mod types;
}

pub use crate::{
    errors::ErrorKind,
    http::{
        body::Body,
        headers::{Header, HeaderMap},
        request::Request,
        response::Response,
        types::{Method, StatusCode, Url, Version},
    },
};

#[cfg(test)]
pub(crate) mod tools {
    use std::str::from_utf8;

    #[inline]
    pub(crate) fn str(value: Option<&[u8]>) -> Option<&str> {
        Some(from_utf8(value?).unwrap())
    }
}
