//! Loop prevention.
//!
//! Two independent checks, either one blocks:
//! 1. the inbound User-Agent carries this proxy's signature (proxy chaining,
//!    whatever the target);
//! 2. the target hostname is on the blocklist, unless the target path is
//!    exactly `/health`.
//!
//! The signature check has no `/health` exemption.

use std::collections::HashSet;
use std::fmt;

use url::{Host, Url};

/// Case-insensitive hostname set. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct BlockedHostnames {
    hosts: HashSet<String>,
}

impl BlockedHostnames {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        set.extend(hosts);
        set
    }

    pub fn extend<I, S>(&mut self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.hosts.extend(
            hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty()),
        );
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.hosts.contains(&hostname.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Why a call was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVerdict {
    Allowed,
    /// Inbound User-Agent matched the proxy signature.
    ProxySignature,
    /// Target hostname is blocklisted.
    BlockedHostname(String),
}

impl LoopVerdict {
    pub fn is_loop(&self) -> bool {
        !matches!(self, LoopVerdict::Allowed)
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            LoopVerdict::Allowed => "allowed",
            LoopVerdict::ProxySignature => "user_agent",
            LoopVerdict::BlockedHostname(_) => "hostname",
        }
    }
}

impl fmt::Display for LoopVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopVerdict::Allowed => f.write_str("allowed"),
            LoopVerdict::ProxySignature => f.write_str("inbound User-Agent carries the proxy signature"),
            LoopVerdict::BlockedHostname(host) => write!(f, "target hostname {} is blocked", host),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopDetector {
    /// Lower-cased signature token, e.g. `rb-slingshot`.
    signature: String,
    blocked: BlockedHostnames,
}

impl LoopDetector {
    pub fn new(signature: impl Into<String>, blocked: BlockedHostnames) -> Self {
        Self {
            signature: signature.into().to_ascii_lowercase(),
            blocked,
        }
    }

    pub fn blocked_hostnames(&self) -> &BlockedHostnames {
        &self.blocked
    }

    /// Judge a call from its inbound User-Agent and final target URL.
    pub fn check(&self, user_agent: Option<&str>, target_url: &str) -> LoopVerdict {
        if let Some(ua) = user_agent {
            if !self.signature.is_empty() && ua.to_ascii_lowercase().contains(&self.signature) {
                return LoopVerdict::ProxySignature;
            }
        }

        // Unparseable targets are left to URL validation.
        let Ok(url) = Url::parse(target_url) else {
            return LoopVerdict::Allowed;
        };
        if url.path() == "/health" {
            return LoopVerdict::Allowed;
        }

        let hostname = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return LoopVerdict::Allowed,
        };
        if self.blocked.contains(&hostname) {
            return LoopVerdict::BlockedHostname(hostname);
        }

        LoopVerdict::Allowed
    }

    pub fn is_loop(&self, user_agent: Option<&str>, target_url: &str) -> bool {
        self.check(user_agent, target_url).is_loop()
    }
}
