//! Caller-visible failures of the explain and chat operations.
use std::fmt;
use std::time::Duration;

/// The throttled capability a request was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Natural-language explanation of a data-quality decision.
    Explain,
    /// Free-form assistant conversation.
    Chat,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Explain => "explain",
            Capability::Chat => "chat",
        }
    }

    fn throttled_hint(&self) -> &'static str {
        match self {
            Capability::Explain => "Please wait before requesting more explanations.",
            Capability::Chat => "Please wait before sending more messages.",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced to the caller.
///
/// Local throttling and upstream quota exhaustion are kept apart so operators can tell
/// which side refused the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Admission control rejected the request before any work was attempted.
    #[error("Rate limit exceeded. {}", .capability.throttled_hint())]
    RateLimited { capability: Capability, retry_after: Duration },
    /// The generative backend refused the call because its own quota is spent.
    #[error("AI service quota exceeded. Please try again later.")]
    UpstreamQuotaExhausted,
}

impl GatewayError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_upstream_quota(&self) -> bool {
        matches!(self, Self::UpstreamQuotaExhausted)
    }

    /// Wait hint for local throttling. Upstream exhaustion carries none.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            Self::UpstreamQuotaExhausted => None,
        }
    }

    /// HTTP status an adapter should answer with. Both kinds are retryable later.
    pub fn status_code(&self) -> u16 {
        429
    }

    /// Stable machine-readable kind, for response bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamQuotaExhausted => "upstream_quota_exhausted",
        }
    }
}
