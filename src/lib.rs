//! Slingshot forwarding proxy library.
//!
//! A browser client describes an HTTP request; the proxy performs it
//! server-side and relays the result as a JSON envelope, raw bytes, or an
//! event stream.

pub mod config;
pub mod files;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

/// Crate version, reported by `/health` and in the default User-Agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
