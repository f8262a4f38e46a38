//! SignalBench gateway: serves analyses to browsers over WebSockets.
//!
//! Each namespace is one analysis. Its handlers either run in this process
//! ([`namespaces::Backend::Local`]) or in a worker process reached over the
//! bus ([`namespaces::Backend::Bridged`]). Browsers connect to
//! `/<namespace>/ws`; `GET /v1/namespaces` lists what is served.

pub mod api;
pub mod bootstrap;
pub mod builtin;
pub mod cli;
pub mod namespaces;
pub mod state;
