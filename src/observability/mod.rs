//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handlers, executor, stream relay produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached by the HTTP layer and shows up
//!   in the TraceLayer span of every request
//! - Metrics calls are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
