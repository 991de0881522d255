//! Outbound capabilities the gateway depends on.
//!
//! The gateway never talks to a concrete model API itself. It is handed a [`TextGenerator`]
//! (prompt in, text out) and a [`DecisionSummarizer`] (decision record in, explanation out);
//! both may fail arbitrarily and the callers in this crate absorb those failures.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::explain::DecisionRecord;

/// Boxed error for collaborators whose failures are only ever absorbed.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Environment variable holding the backend credential unless configured otherwise.
pub const DEFAULT_CREDENTIAL_ENV: &str = "GEMINI_API_KEY";

/// Failure signals a [`TextGenerator`] can raise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend's own quota or rate limit is exhausted.
    #[error("upstream quota exhausted")]
    QuotaExhausted,
    /// No credential (or otherwise unusable configuration).
    #[error("backend not configured: {0}")]
    NotConfigured(String),
    /// Anything else: transport errors, malformed responses, safety blocks.
    #[error("{0}")]
    Other(String),
}

/// "Generate text": one synchronous round trip to the generative backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        (**self).generate(prompt).await
    }
}

/// "Summarize decision": produce a natural-language explanation for a decision record.
#[async_trait]
pub trait DecisionSummarizer: Send + Sync {
    async fn summarize(&self, record: &DecisionRecord) -> Result<String, BoxError>;
}

/// Backend credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a credential; blank values count as absent.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Read the credential from `var`.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().and_then(Self::new)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([redacted])")
    }
}

/// Stand-in generator used when no credential is available.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    /// The generator to use when `var` holds no credential.
    pub fn missing_env(var: &str) -> Self {
        Self::new(format!("{var} environment variable is not set"))
    }
}

#[async_trait]
impl TextGenerator for Unconfigured {
    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        Err(BackendError::NotConfigured(self.reason.clone()))
    }
}

/// Summarizer that asks a [`TextGenerator`] to explain the decision.
#[derive(Debug, Clone)]
pub struct GeneratorSummarizer<G> {
    generator: G,
}

impl<G> GeneratorSummarizer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Prompt sent to the generator for `record`.
    pub fn prompt_for(record: &DecisionRecord) -> String {
        format!(
            "Explain the following data-quality decision in two or three plain sentences.\n\
             Field: {}\nCurrent value: {}\nCandidate values: {}\nChosen value: {}\n\
             Confidence: {:.2}\nDecision: {}",
            record.field,
            record.current_value.as_deref().unwrap_or("None"),
            record.candidates.join(", "),
            record.chosen_value.as_deref().unwrap_or("None"),
            record.confidence,
            record.decision,
        )
    }
}

#[async_trait]
impl<G: TextGenerator> DecisionSummarizer for GeneratorSummarizer<G> {
    async fn summarize(&self, record: &DecisionRecord) -> Result<String, BoxError> {
        let text = self.generator.generate(&Self::prompt_for(record)).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err("generator returned an empty explanation".into());
        }
        Ok(text.to_string())
    }
}
