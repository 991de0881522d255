//! Convenient re-exports for common Turnstile types.
pub use crate::{
    backend::{ApiKey, BackendError, DecisionSummarizer, TextGenerator, Unconfigured},
    chat::{ChatTurn, Role},
    config::GatewayConfig,
    error::{Capability, GatewayError},
    explain::DecisionRecord,
    gateway::Gateway,
    invoker::{CallOutcome, ResilientInvoker},
    rate_limit::{Admission, AdmissionError, Decision, RateLimitLayer, RateLimitRegistry, WindowLimits},
    telemetry::{GatewayEvent, LogSink, MemorySink, TelemetrySink},
};
