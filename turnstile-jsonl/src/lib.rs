//! JSONL sink for `turnstile`. Writes one gateway event per line.
//! Always appends; bring your own path.

use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use turnstile::telemetry::{
    AdmissionEvent, DegradeReason, FallbackEvent, GatewayEvent, InvocationEvent, TelemetrySink,
};

#[derive(Clone, Debug)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl tower_service::Service<GatewayEvent> for JsonlSink {
    type Response = ();
    type Error = io::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: GatewayEvent) -> Self::Future {
        let path = self.path.clone();
        let line = event_to_json(&event).to_string() + "\n";
        Box::pin(async move {
            use tokio::io::AsyncWriteExt;
            let mut file =
                tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
            file.write_all(line.as_bytes()).await.map_err(|e| {
                tracing::warn!(target: "turnstile::jsonl", path = %path.display(), error = %e, "event write failed");
                e
            })?;
            file.flush().await?;
            Ok(())
        })
    }
}

impl TelemetrySink for JsonlSink {
    type SinkError = io::Error;
}

/// JSON form of a gateway event. Durations are whole milliseconds.
pub fn event_to_json(event: &GatewayEvent) -> serde_json::Value {
    match event {
        GatewayEvent::Admission(a) => match a {
            AdmissionEvent::Admitted { capability, remaining } => {
                json!({ "kind": "admitted", "capability": capability.as_str(), "remaining": remaining })
            }
            AdmissionEvent::Rejected { capability, retry_after } => {
                json!({ "kind": "rejected", "capability": capability.as_str(), "retry_after_ms": retry_after.as_millis() as u64 })
            }
        },
        GatewayEvent::Invocation(i) => match i {
            InvocationEvent::Succeeded { duration } => {
                json!({ "kind": "invocation_succeeded", "duration_ms": duration.as_millis() as u64 })
            }
            InvocationEvent::QuotaExceeded { duration } => {
                json!({ "kind": "invocation_quota_exceeded", "duration_ms": duration.as_millis() as u64 })
            }
            InvocationEvent::Unconfigured => json!({ "kind": "invocation_unconfigured" }),
            InvocationEvent::Failed { duration } => {
                json!({ "kind": "invocation_failed", "duration_ms": duration.as_millis() as u64 })
            }
        },
        GatewayEvent::Fallback(f) => match f {
            FallbackEvent::TemplatedExplanation => json!({ "kind": "templated_explanation" }),
            FallbackEvent::DegradedReply { reason } => {
                let reason = match reason {
                    DegradeReason::Unconfigured => "unconfigured",
                    DegradeReason::BackendFailure => "backend_failure",
                };
                json!({ "kind": "degraded_reply", "reason": reason })
            }
        },
    }
}
