//! Terminal handlers (C10): the leaves of the handler chain that actually
//! produce a response rather than delegating to a successor.

pub mod code_router;
pub mod debug;
pub mod file_router;
pub mod forward_proxy;
pub mod reverse_proxy;
pub mod upstream;

pub use code_router::{CodeRouter, CodeRouterBuilder};
pub use debug::DebugRouter;
pub use file_router::{FileRouter, FileRouterConfig};
pub use forward_proxy::{ForwardProxy, ForwardProxyConfig};
pub use reverse_proxy::{ReverseProxy, ReverseProxyConfig};
pub use upstream::{TcpUpstreamClient, UpstreamAddress, UpstreamClient};
