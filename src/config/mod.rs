//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (port, feature flags, blocklist file)
//!     → ProxyConfig (validated, immutable)
//!     → shared via AppState to all handlers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_blocked_hostnames, ConfigError};
pub use schema::{
    FeatureConfig, LimitsConfig, ListenerConfig, LogFormat, LoopGuardConfig, ObservabilityConfig,
    ProxyConfig, TimeoutConfig, UpstreamConfig,
};
