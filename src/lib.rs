#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Turnstile
//!
//! Request-handling core that sits between end users and a generative-text backend:
//! per-client sliding-window throttling plus graceful degradation when the backend is
//! unavailable or misbehaves.
//!
//! ## Features
//!
//! - **Admission control**: strict sliding-window counters keyed by client identity, one
//!   independent registry per capability
//! - **Resilient invocation**: every backend call yields a classified [`CallOutcome`]; callers
//!   never see a raw fault
//! - **Deterministic fallbacks**: templated explanations and fixed user-safe chat replies
//! - **Tower middleware** for throttling arbitrary services
//! - **Telemetry** through composable `tower::Service` sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use turnstile::{ChatTurn, Gateway, GatewayConfig, Unconfigured};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = Gateway::builder(GatewayConfig::default())
//!         .generator(Arc::new(Unconfigured::missing_env("GEMINI_API_KEY")))
//!         .build()
//!         .unwrap();
//!
//!     // Without a credential the chat path answers with a friendly message, not an error.
//!     let reply = gateway.chat("203.0.113.7", "hello", &[ChatTurn::user("hi")]).await.unwrap();
//!     assert!(reply.starts_with("I'm currently unavailable"));
//! }
//! ```

pub mod adaptive;
pub mod backend;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod explain;
pub mod gateway;
pub mod invoker;
pub mod prelude;
pub mod rate_limit;
pub mod telemetry;
pub mod timeout;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use backend::{
    ApiKey, BackendError, BoxError, DecisionSummarizer, GeneratorSummarizer, TextGenerator,
    Unconfigured,
};
pub use chat::{ChatService, ChatTurn, PromptTemplate, Role};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, GatewayConfig};
pub use error::{Capability, GatewayError};
pub use explain::{fallback_explanation, DecisionRecord, ExplainService};
pub use gateway::{Gateway, GatewayBuilder};
pub use invoker::{CallOutcome, ResilientInvoker};
pub use rate_limit::{Admission, Decision, RateLimitLayer, RateLimitRegistry, WindowLimits};
pub use timeout::TimeoutPolicy;
