//! Caching forward HTTP proxy library.
//!
//! Clients point their HTTP client at the proxy; absolute-form requests are
//! forwarded to the named origin and cacheable responses are kept in a
//! size-bounded LRU cache keyed by request target. A second port accepts raw
//! socket connections for CONNECT tunneling and line-based forwarding.

pub mod admission;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;
pub mod upstream;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::Shutdown;
pub use server::ProxyServer;
