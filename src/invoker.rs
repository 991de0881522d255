//! Resilient invoker: one outbound generation call, always a well-formed outcome.
//!
//! Semantics:
//! - The backend is called exactly once per [`ResilientInvoker::invoke`]; there is no retry.
//! - Failure signals are classified into [`CallOutcome`]: quota exhaustion, missing
//!   configuration, and everything else. A panic inside the backend client and an expired
//!   (optional) deadline both count as "everything else".
//! - Failure details are reduced to one short line with registered secrets masked before they
//!   leave this module.
//!
//! No admission-control state is touched here, so no lock is held while the call is in flight.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::backend::{ApiKey, BackendError, TextGenerator};
use crate::telemetry::{emit_best_effort, GatewayEvent, InvocationEvent, NullSink, TelemetrySink};
use crate::timeout::{TimedOut, TimeoutPolicy};

/// Longest failure detail handed back to callers, in characters.
pub const MAX_DETAIL_LEN: usize = 160;

const REDACTED: &str = "[redacted]";

/// Classified result of one call to the generative backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Trimmed response text.
    Success(String),
    /// The backend's own quota is exhausted.
    QuotaExceeded,
    /// The backend has no credential.
    Unconfigured,
    /// Any other failure, with a short non-sensitive description.
    OtherFailure(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success(text) => Some(text),
            _ => None,
        }
    }
}

/// Why a guarded future produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    Panicked,
    TimedOut(TimedOut),
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupted::Panicked => write!(f, "upstream client panicked"),
            Interrupted::TimedOut(t) => write!(f, "upstream call timed out after {:?}", t.timeout),
        }
    }
}

/// Drive `future` while absorbing panics and, when configured, enforcing a deadline.
pub(crate) async fn guarded<F>(future: F, timeout: Option<TimeoutPolicy>) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    let caught = AssertUnwindSafe(future).catch_unwind();
    let result = match timeout {
        Some(policy) => policy.run(caught).await.map_err(Interrupted::TimedOut)?,
        None => caught.await,
    };
    result.map_err(|_| Interrupted::Panicked)
}

/// Wraps a [`TextGenerator`] so that callers only ever see a [`CallOutcome`].
pub struct ResilientInvoker<S = NullSink> {
    backend: Arc<dyn TextGenerator>,
    timeout: Option<TimeoutPolicy>,
    secrets: Vec<String>,
    sink: S,
}

impl<S: std::fmt::Debug> std::fmt::Debug for ResilientInvoker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("backend", &"<text generator>")
            .field("timeout", &self.timeout)
            .field("secrets", &self.secrets.len())
            .field("sink", &self.sink)
            .finish()
    }
}

impl ResilientInvoker<NullSink> {
    pub fn new(backend: Arc<dyn TextGenerator>) -> Self {
        Self { backend, timeout: None, secrets: Vec::new(), sink: NullSink }
    }
}

impl<S> ResilientInvoker<S> {
    /// Give up on the backend after `policy`'s duration.
    pub fn with_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = Some(policy);
        self
    }

    /// Mask `secret` in any failure detail.
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Mask the backend credential in any failure detail.
    pub fn redact_key(self, key: &ApiKey) -> Self {
        self.redact(key.expose())
    }

    pub fn with_sink<T>(self, sink: T) -> ResilientInvoker<T> {
        ResilientInvoker {
            backend: self.backend,
            timeout: self.timeout,
            secrets: self.secrets,
            sink,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(|t| t.duration())
    }
}

impl<S> ResilientInvoker<S>
where
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Call the backend once and classify the result. Never fails and never panics.
    pub async fn invoke(&self, prompt: &str) -> CallOutcome {
        let start = Instant::now();
        let result = guarded(self.backend.generate(prompt), self.timeout).await;
        let duration = start.elapsed();

        let (outcome, event) = match result {
            Ok(Ok(text)) => {
                debug!(target: "turnstile::invoker", ?duration, "backend call succeeded");
                (CallOutcome::Success(text.trim().to_string()), InvocationEvent::Succeeded { duration })
            }
            Ok(Err(BackendError::QuotaExhausted)) => {
                warn!(target: "turnstile::invoker", ?duration, "backend quota exhausted");
                (CallOutcome::QuotaExceeded, InvocationEvent::QuotaExceeded { duration })
            }
            Ok(Err(BackendError::NotConfigured(reason))) => {
                warn!(
                    target: "turnstile::invoker",
                    reason = %self.sanitize(&reason),
                    "backend not configured"
                );
                (CallOutcome::Unconfigured, InvocationEvent::Unconfigured)
            }
            Ok(Err(BackendError::Other(detail))) => self.failed(&detail, duration),
            Err(interrupted) => self.failed(&interrupted.to_string(), duration),
        };

        emit_best_effort(self.sink.clone(), GatewayEvent::Invocation(event)).await;
        outcome
    }

    fn failed(&self, raw: &str, duration: Duration) -> (CallOutcome, InvocationEvent) {
        let detail = self.sanitize(raw);
        warn!(target: "turnstile::invoker", ?duration, detail = %detail, "backend call failed");
        (CallOutcome::OtherFailure(detail), InvocationEvent::Failed { duration })
    }

    fn sanitize(&self, raw: &str) -> String {
        sanitize_detail(raw, &self.secrets)
    }
}

/// First non-blank line of `raw`, secrets masked, capped at [`MAX_DETAIL_LEN`] characters.
pub fn sanitize_detail(raw: &str, secrets: &[String]) -> String {
    let mut line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("upstream call failed")
        .to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        line = line.replace(secret.as_str(), REDACTED);
    }
    if line.chars().count() > MAX_DETAIL_LEN {
        line = line.chars().take(MAX_DETAIL_LEN).collect::<String>() + "...";
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Result<String, BackendError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: Result<String, BackendError>) -> Arc<Self> {
            Arc::new(Self { reply, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    struct Panics;

    #[async_trait]
    impl TextGenerator for Panics {
        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            panic!("client bug")
        }
    }

    struct Hangs;

    #[async_trait]
    impl TextGenerator for Hangs {
        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn success_is_trimmed_and_called_once() {
        let backend = Scripted::new(Ok("  hello there \n".into()));
        let invoker = ResilientInvoker::new(backend.clone());
        assert_eq!(invoker.invoke("p").await, CallOutcome::Success("hello there".into()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn classifies_backend_signals() {
        let quota = ResilientInvoker::new(Scripted::new(Err(BackendError::QuotaExhausted)));
        assert_eq!(quota.invoke("p").await, CallOutcome::QuotaExceeded);

        let unconfigured =
            ResilientInvoker::new(Scripted::new(Err(BackendError::NotConfigured("no key".into()))));
        assert_eq!(unconfigured.invoke("p").await, CallOutcome::Unconfigured);

        let other = ResilientInvoker::new(Scripted::new(Err(BackendError::Other("503".into()))));
        assert_eq!(other.invoke("p").await, CallOutcome::OtherFailure("503".into()));
    }

    #[tokio::test]
    async fn failure_detail_never_leaks_the_credential() {
        let key = ApiKey::new("AIzaSECRET123").unwrap();
        let backend = Scripted::new(Err(BackendError::Other(
            "403 for https://api.example/v1?key=AIzaSECRET123\n  at client.rs:10".into(),
        )));
        let invoker = ResilientInvoker::new(backend).redact_key(&key);

        let CallOutcome::OtherFailure(detail) = invoker.invoke("p").await else {
            panic!("expected OtherFailure");
        };
        assert_eq!(detail, "403 for https://api.example/v1?key=[redacted]");
    }

    #[test]
    fn long_details_are_capped() {
        let raw = "x".repeat(500);
        let detail = sanitize_detail(&raw, &[]);
        assert_eq!(detail.chars().count(), MAX_DETAIL_LEN + 3);
        assert_eq!(sanitize_detail("\n\n", &[]), "upstream call failed");
    }

    #[tokio::test]
    async fn panicking_backend_becomes_other_failure() {
        let invoker = ResilientInvoker::new(Arc::new(Panics));
        assert_eq!(
            invoker.invoke("p").await,
            CallOutcome::OtherFailure("upstream client panicked".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_hang_into_other_failure() {
        let invoker = ResilientInvoker::new(Arc::new(Hangs))
            .with_timeout(TimeoutPolicy::new(Duration::from_secs(2)).unwrap());
        let outcome = invoker.invoke("p").await;
        assert_eq!(outcome, CallOutcome::OtherFailure("upstream call timed out after 2s".into()));
    }

    #[tokio::test]
    async fn emits_one_invocation_event_per_call() {
        let sink = MemorySink::new();
        let invoker =
            ResilientInvoker::new(Scripted::new(Err(BackendError::QuotaExhausted))).with_sink(sink.clone());
        invoker.invoke("p").await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            GatewayEvent::Invocation(InvocationEvent::QuotaExceeded { .. })
        ));
    }
}
