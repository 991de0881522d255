//! Telemetry for the gateway.
//!
//! Admission checks, backend invocations and fallbacks each emit a structured
//! [`GatewayEvent`]. Events flow through `TelemetrySink` implementations which can log,
//! buffer, or forward them to external systems.
//!
//! # Event Types
//!
//! - **Admission**: `Admitted`, `Rejected`
//! - **Invocation**: `Succeeded`, `QuotaExceeded`, `Unconfigured`, `Failed`
//! - **Fallback**: `TemplatedExplanation`, `DegradedReply`
//!
//! # Telemetry Sinks
//!
//! The `TelemetrySink` trait is a `tower::Service<GatewayEvent>` so sinks compose with
//! standard tower combinators. Emission is best-effort: a failing sink never fails a request.
//!
//! ```rust
//! use turnstile::telemetry::{AdmissionEvent, GatewayEvent};
//! use turnstile::Capability;
//! use std::time::Duration;
//!
//! let rejected = GatewayEvent::Admission(AdmissionEvent::Rejected {
//!     capability: Capability::Chat,
//!     retry_after: Duration::from_secs(3),
//! });
//! assert_eq!(rejected.to_string(), "Admission::Rejected(chat, retry_after=3s)");
//! ```

pub mod events;
pub mod sinks;

pub use events::{AdmissionEvent, DegradeReason, FallbackEvent, GatewayEvent, InvocationEvent};
pub use sinks::{
    emit_best_effort, ComposedSinkError, LogSink, MemorySink, MulticastSink, NullSink,
    TelemetrySink,
};
