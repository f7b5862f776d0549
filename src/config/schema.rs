//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the forwarding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Caller timeout policy and outbound transport timeouts.
    pub timeouts: TimeoutConfig,

    /// Outbound connection pool settings.
    pub upstream: UpstreamConfig,

    /// Loop prevention (signature token, hostname blocklist).
    pub loop_guard: LoopGuardConfig,

    /// Optional endpoints.
    pub features: FeatureConfig,

    /// Inbound payload limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Replace the port of the bind address, keeping its IP.
    pub fn set_port(&mut self, port: u16) {
        let mut addr: SocketAddr = self
            .listener
            .bind_address
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));
        addr.set_port(port);
        self.listener.bind_address = addr.to_string();
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7331").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7331".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Applied when a caller sends no timeout (or zero), in seconds.
    pub default_request_secs: u64,

    /// Upper bound for caller-supplied timeouts, in seconds.
    pub max_request_secs: u64,

    /// Outbound connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_request_secs: 60,
            max_request_secs: 120,
            connect_secs: 10,
            pool_idle_secs: 30,
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Idle connections kept per upstream host.
    pub max_idle_per_host: usize,

    /// Redirect hops followed when a caller asks for redirects.
    pub max_redirects: usize,

    /// Honour HTTP_PROXY / HTTPS_PROXY / NO_PROXY from the environment.
    pub use_system_proxy: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            max_redirects: 10,
            use_system_proxy: true,
        }
    }
}

/// Loop prevention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopGuardConfig {
    /// Token carried in this proxy's User-Agent and looked for on inbound calls.
    pub signature: String,

    /// Hostnames that may never be targeted (except at `/health`).
    pub blocked_hostnames: Vec<String>,

    /// Extra hostnames, one per line.
    pub blocklist_file: Option<PathBuf>,
}

impl Default for LoopGuardConfig {
    fn default() -> Self {
        Self {
            signature: "rb-slingshot".to_string(),
            blocked_hostnames: vec![
                "p.requestbite.com".to_string(),
                "dev.p.requestbite.com".to_string(),
            ],
            blocklist_file: None,
        }
    }
}

/// Optional endpoints, all disabled by default.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FeatureConfig {
    /// Serve `POST /file` and `POST /dir`.
    pub local_files: bool,
}

/// Inbound request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound payload size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 32 * 1024 * 1024, // 32MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
