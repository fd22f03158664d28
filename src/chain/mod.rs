//! The handler chain (C8 contract + C9 stages): an ownership tree of
//! behavior-modifying stages terminating in a terminal handler.
//!
//! A [`Handler`] is any type that maps `(ConnectionInfo, Request) -> Response`.
//! Stages compose by holding their successor and invoking it at their
//! discretion — there is no dynamic registration or reflection; the whole tree
//! is built once, at startup, and shared read-only (behind `Arc`) across every
//! connection worker thereafter.

pub mod basic_auth;
pub mod compression;
pub mod default_headers;
pub mod enforce_https;
pub mod head_adapt;
pub mod minification;
pub mod precondition;
pub mod rewrite_redirects;
pub mod virtual_host;

use crate::{http::request::Request, net::ConnectionInfo, Response};
use std::{future::Future, pin::Pin, sync::Arc};

/// A boxed, type-erased future, the return type every [`Handler`] produces.
///
/// Plain `async fn` in a trait isn't object-safe, and this chain needs dynamic
/// dispatch (each stage holds `Arc<dyn Handler>` as its `next`), so the future
/// is boxed by hand at the trait boundary — the same shape used by handler
/// traits across the async ecosystem (tower's `Service`, hyper's `Service`).
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Response> + Send + 'a>>;

/// The handler contract (C8): `(ConnectionInfo, Request) -> Response`.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a>;
}

/// Blanket impl so a plain async closure-like function pointer can serve as a
/// leaf handler without a wrapper type, handy for tests and tiny examples.
impl<F> Handler for F
where
    F: for<'a> Fn(&'a ConnectionInfo, &'a mut Request) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        self(info, request)
    }
}

/// A shared, reference-counted handle to an assembled chain (or any single
/// handler within it). Cloning is cheap; every connection worker holds one.
pub type SharedHandler = Arc<dyn Handler>;
