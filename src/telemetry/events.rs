use crate::error::Capability;
use std::fmt;
use std::time::Duration;

/// Events emitted while handling explain and chat requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Admission-control decisions
    Admission(AdmissionEvent),
    /// Outcomes of calls to the generative backend
    Invocation(InvocationEvent),
    /// A substitute answer was served instead of a generated one
    Fallback(FallbackEvent),
}

/// Events emitted by the admission registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionEvent {
    /// The request was counted and may proceed.
    Admitted {
        capability: Capability,
        /// Slots left in the caller's window
        remaining: u32,
    },
    /// The caller is over quota; no further work was attempted.
    Rejected {
        capability: Capability,
        /// Time until a slot frees up
        retry_after: Duration,
    },
}

/// Events emitted by the resilient invoker, one per outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEvent {
    /// The backend answered.
    Succeeded { duration: Duration },
    /// The backend refused because its own quota is spent.
    QuotaExceeded { duration: Duration },
    /// The backend has no usable credential.
    Unconfigured,
    /// Any other failure, including timeouts and panics in the backend client.
    Failed { duration: Duration },
}

/// Why a chat reply was replaced by a canned message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    Unconfigured,
    BackendFailure,
}

/// Events emitted when a deterministic substitute is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackEvent {
    /// The explain path fell back to the offline template.
    TemplatedExplanation,
    /// The chat path answered with a fixed user-safe message.
    DegradedReply { reason: DegradeReason },
}

impl fmt::Display for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayEvent::Admission(event) => write!(f, "Admission::{}", event),
            GatewayEvent::Invocation(event) => write!(f, "Invocation::{}", event),
            GatewayEvent::Fallback(event) => write!(f, "Fallback::{}", event),
        }
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionEvent::Admitted { capability, remaining } => {
                write!(f, "Admitted({}, remaining={})", capability, remaining)
            }
            AdmissionEvent::Rejected { capability, retry_after } => {
                write!(f, "Rejected({}, retry_after={:?})", capability, retry_after)
            }
        }
    }
}

impl fmt::Display for InvocationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationEvent::Succeeded { duration } => write!(f, "Succeeded({:?})", duration),
            InvocationEvent::QuotaExceeded { duration } => {
                write!(f, "QuotaExceeded({:?})", duration)
            }
            InvocationEvent::Unconfigured => write!(f, "Unconfigured"),
            InvocationEvent::Failed { duration } => write!(f, "Failed({:?})", duration),
        }
    }
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::Unconfigured => write!(f, "unconfigured"),
            DegradeReason::BackendFailure => write!(f, "backend_failure"),
        }
    }
}

impl fmt::Display for FallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackEvent::TemplatedExplanation => write!(f, "TemplatedExplanation"),
            FallbackEvent::DegradedReply { reason } => write!(f, "DegradedReply({})", reason),
        }
    }
}
