//! Decision-explanation operation.
//!
//! Once admitted, explaining a decision cannot fail: if the summarizer errors, panics, times
//! out or returns nothing, a templated explanation built purely from the record is served.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{ApiKey, DecisionSummarizer};
use crate::error::{Capability, GatewayError};
use crate::invoker::{guarded, sanitize_detail};
use crate::rate_limit::{check_admission, RateLimitRegistry};
use crate::telemetry::{emit_best_effort, FallbackEvent, GatewayEvent, NullSink, TelemetrySink};
use crate::timeout::TimeoutPolicy;

/// A data-quality decision to be explained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub field: String,
    #[serde(default)]
    pub current_value: Option<String>,
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub chosen_value: Option<String>,
    /// Confidence score in `[0, 1]`.
    pub confidence: f64,
    /// Decision label, e.g. `auto` or `manual_review`.
    pub decision: String,
}

/// Offline explanation for `record`. Pure and infallible.
///
/// ```
/// use turnstile::explain::{fallback_explanation, DecisionRecord};
///
/// let record = DecisionRecord {
///     field: "npi".into(),
///     current_value: None,
///     candidates: vec!["A".into(), "B".into()],
///     chosen_value: Some("A".into()),
///     confidence: 0.8357,
///     decision: "auto".into(),
/// };
/// assert_eq!(
///     fallback_explanation(&record),
///     "Decision for npi: chose A with confidence 0.84 from sources ['A', 'B']."
/// );
/// ```
pub fn fallback_explanation(record: &DecisionRecord) -> String {
    format!(
        "Decision for {}: chose {} with confidence {:.2} from sources {}.",
        record.field,
        record.chosen_value.as_deref().unwrap_or("None"),
        record.confidence,
        render_candidates(&record.candidates),
    )
}

fn render_candidates(candidates: &[String]) -> String {
    let quoted: Vec<String> = candidates.iter().map(|c| format!("'{}'", c)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Throttled explanation service.
pub struct ExplainService<S = NullSink> {
    registry: Arc<RateLimitRegistry>,
    summarizer: Arc<dyn DecisionSummarizer>,
    timeout: Option<TimeoutPolicy>,
    secrets: Vec<String>,
    sink: S,
}

impl ExplainService<NullSink> {
    pub fn new(registry: Arc<RateLimitRegistry>, summarizer: Arc<dyn DecisionSummarizer>) -> Self {
        Self { registry, summarizer, timeout: None, secrets: Vec::new(), sink: NullSink }
    }
}

impl<S> ExplainService<S> {
    /// Stop waiting for the summarizer after `policy`'s duration and use the template.
    pub fn with_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = Some(policy);
        self
    }

    /// Mask the backend credential in logged summarizer failures.
    pub fn redact_key(mut self, key: &ApiKey) -> Self {
        self.secrets.push(key.expose().to_string());
        self
    }

    pub fn with_sink<T>(self, sink: T) -> ExplainService<T> {
        ExplainService {
            registry: self.registry,
            summarizer: self.summarizer,
            timeout: self.timeout,
            secrets: self.secrets,
            sink,
        }
    }

    pub fn registry(&self) -> &Arc<RateLimitRegistry> {
        &self.registry
    }
}

impl<S> ExplainService<S>
where
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Explain `record` for the caller identified by `identity`.
    ///
    /// The only error is [`GatewayError::RateLimited`]; a rejected request never reaches the
    /// summarizer and never produces fallback text.
    pub async fn explain(&self, identity: &str, record: &DecisionRecord) -> Result<String, GatewayError> {
        check_admission(&self.registry, Capability::Explain, identity, &self.sink).await?;

        let failure = match guarded(self.summarizer.summarize(record), self.timeout).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!(target: "turnstile::explain", field = %record.field, "summarizer answered");
                return Ok(text.trim().to_string());
            }
            Ok(Ok(_)) => "summarizer returned an empty explanation".to_string(),
            Ok(Err(e)) => sanitize_detail(&e.to_string(), &self.secrets),
            Err(interrupted) => interrupted.to_string(),
        };

        info!(
            target: "turnstile::explain",
            field = %record.field,
            reason = %failure,
            "serving templated explanation"
        );
        emit_best_effort(self.sink.clone(), GatewayEvent::Fallback(FallbackEvent::TemplatedExplanation))
            .await;
        Ok(fallback_explanation(record))
    }
}
