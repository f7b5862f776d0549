//! Forwarding engine.
//!
//! # Data Flow
//! ```text
//! payload (JSON or query + form body)
//!     → model.rs (parse, defaults, path params)
//!     → loop_guard.rs (signature + hostname gate)
//!     → executor.rs (deadline, redirect policy, transport errors)
//!     → classify.rs / envelope.rs (binary detection, metrics, JSON shape)
//!     → stream.rs (event-stream relay when requested and applicable)
//! ```

pub mod classify;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod loop_guard;
pub mod model;
pub mod stream;

pub use envelope::{RequestMetrics, ResponseEnvelope, StreamingEnvelope};
pub use error::{EnvelopeError, ErrorKind, ForwardError};
pub use executor::{default_user_agent, RequestExecutor, StreamOutcome};
pub use loop_guard::{BlockedHostnames, LoopDetector, LoopVerdict};
pub use model::{FormRequest, OutboundRequest, RequestDefaults};
pub use stream::EventStreamRelay;
