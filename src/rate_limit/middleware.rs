use crate::rate_limit::{Admission, Decision};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;

/// Error produced by [`RateLimitService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError<E> {
    /// The caller's identity is over quota; the inner service was not called.
    Rejected { retry_after: Duration },
    /// The inner service failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { retry_after } => {
                write!(f, "rate limit exceeded (retry after {:?})", retry_after)
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AdmissionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

impl<E> AdmissionError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Rejected { retry_after } => Some(*retry_after),
            Self::Inner(_) => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

/// A layer that throttles requests per identity using an [`Admission`].
///
/// `identify` derives the identity (typically the peer address) from each request.
pub struct RateLimitLayer<A, F> {
    admission: Arc<A>,
    identify: Arc<F>,
}

impl<A, F> Clone for RateLimitLayer<A, F> {
    fn clone(&self) -> Self {
        Self { admission: self.admission.clone(), identify: self.identify.clone() }
    }
}

impl<A, F> fmt::Debug for RateLimitLayer<A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer").finish_non_exhaustive()
    }
}

impl<A, F> RateLimitLayer<A, F> {
    pub fn new(admission: Arc<A>, identify: F) -> Self {
        Self { admission, identify: Arc::new(identify) }
    }
}

impl<S, A, F> Layer<S> for RateLimitLayer<A, F> {
    type Service = RateLimitService<S, A, F>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            admission: self.admission.clone(),
            identify: self.identify.clone(),
        }
    }
}

/// Middleware service that rejects over-quota identities before calling `inner`.
pub struct RateLimitService<S, A, F> {
    inner: S,
    admission: Arc<A>,
    identify: Arc<F>,
}

impl<S: Clone, A, F> Clone for RateLimitService<S, A, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            admission: self.admission.clone(),
            identify: self.identify.clone(),
        }
    }
}

impl<S, A, F, Req> Service<Req> for RateLimitService<S, A, F>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    A: Admission + 'static,
    F: Fn(&Req) -> String + Send + Sync + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = AdmissionError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let identity = (self.identify)(&req);
        // Bookkeeping finishes here, before the inner call is polled.
        match self.admission.admit(&identity) {
            Decision::Admitted { .. } => {
                // Take the service that was driven to readiness; leave a fresh clone behind.
                let clone = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, clone);
                Box::pin(async move { inner.call(req).await.map_err(AdmissionError::Inner) })
            }
            Decision::Rejected { retry_after } => {
                Box::pin(async move { Err(AdmissionError::Rejected { retry_after }) })
            }
        }
    }
}
