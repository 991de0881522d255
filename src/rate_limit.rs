//! Per-client admission control.
//!
//! This module provides the building blocks for throttling callers:
//! - [`RateLimitRegistry`]: sliding-window counters keyed by client identity.
//! - [`Decision`]: the result of an admission check (Admitted/Rejected).
//! - [`RateLimitLayer`]: Tower middleware that consults an [`Admission`] before the inner service.
//!
//! # Algorithm
//!
//! Every identity owns a [`ClientWindow`] of admission instants. On each check the window is
//! pruned against `now` (a timestamp `t` is stale once `now - t >= window`), the survivors are
//! counted, and the request is admitted only if the count is below the quota. Admitted requests
//! append `now`. This is a strict sliding window: no interval of length `window` ever contains
//! more than `quota` admissions for one identity, including around bucket boundaries.

use std::time::Duration;

use crate::error::{Capability, GatewayError};
use crate::telemetry::{emit_best_effort, AdmissionEvent, GatewayEvent, TelemetrySink};

pub mod middleware;
pub mod registry;
pub mod window;

pub use middleware::{AdmissionError, RateLimitLayer, RateLimitService};
pub use registry::{RateLimitRegistry, WindowSnapshot};
pub use window::ClientWindow;

/// The decision returned by an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Admitted {
        /// Slots left in the window after this admission.
        /// Useful for `X-RateLimit-Remaining` headers.
        remaining: u32,
    },
    /// The request must be turned away.
    Rejected {
        /// Time until the oldest counted request leaves the window.
        /// Useful for `Retry-After` headers.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_admitted()
    }

    /// Wait hint for rejected decisions.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Rejected { retry_after } => Some(*retry_after),
            Decision::Admitted { .. } => None,
        }
    }
}

/// Invalid quota/window combination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitsError {
    #[error("quota must be greater than zero")]
    ZeroQuota,
    #[error("window duration must be greater than zero")]
    ZeroWindow,
}

/// Quota and window length for one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    quota: u32,
    window: Duration,
}

impl WindowLimits {
    pub fn new(quota: u32, window: Duration) -> Result<Self, LimitsError> {
        if quota == 0 {
            return Err(LimitsError::ZeroQuota);
        }
        if window.is_zero() {
            return Err(LimitsError::ZeroWindow);
        }
        Ok(Self { quota, window })
    }

    /// Shorthand for a `quota` per `secs` seconds.
    pub fn per_seconds(quota: u32, secs: u64) -> Result<Self, LimitsError> {
        Self::new(quota, Duration::from_secs(secs))
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Anything that can decide whether an identity may proceed right now.
///
/// Implementations never fail: rejection is a normal [`Decision`].
pub trait Admission: Send + Sync {
    fn admit(&self, identity: &str) -> Decision;
}

impl<A: Admission + ?Sized> Admission for std::sync::Arc<A> {
    fn admit(&self, identity: &str) -> Decision {
        (**self).admit(identity)
    }
}

/// Run an admission check for a capability, report it, and turn a rejection into an error.
///
/// Bookkeeping is finished (and the registry lock released) before this returns, so callers
/// can start the expensive work right after.
pub(crate) async fn check_admission<S>(
    registry: &RateLimitRegistry,
    capability: Capability,
    identity: &str,
    sink: &S,
) -> Result<(), GatewayError>
where
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    let decision = registry.admit(identity);
    let event = match decision {
        Decision::Admitted { remaining } => AdmissionEvent::Admitted { capability, remaining },
        Decision::Rejected { retry_after } => AdmissionEvent::Rejected { capability, retry_after },
    };
    emit_best_effort(sink.clone(), GatewayEvent::Admission(event)).await;

    match decision {
        Decision::Admitted { .. } => Ok(()),
        Decision::Rejected { retry_after } => {
            Err(GatewayError::RateLimited { capability, retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_reject_zero_values() {
        assert_eq!(WindowLimits::new(0, Duration::from_secs(1)), Err(LimitsError::ZeroQuota));
        assert_eq!(WindowLimits::new(1, Duration::ZERO), Err(LimitsError::ZeroWindow));
        let ok = WindowLimits::per_seconds(5, 60).unwrap();
        assert_eq!(ok.quota(), 5);
        assert_eq!(ok.window(), Duration::from_secs(60));
    }

    #[test]
    fn decision_helpers() {
        let admitted = Decision::Admitted { remaining: 2 };
        assert!(admitted.is_admitted());
        assert_eq!(admitted.retry_after(), None);

        let rejected = Decision::Rejected { retry_after: Duration::from_secs(4) };
        assert!(rejected.is_rejected());
        assert_eq!(rejected.retry_after(), Some(Duration::from_secs(4)));
    }
}
