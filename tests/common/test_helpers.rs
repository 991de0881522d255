use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use turnstile::backend::BoxError;
use turnstile::{BackendError, DecisionRecord, DecisionSummarizer, TextGenerator};

/// Generator that always answers with the same result and records every prompt.
pub struct ScriptedGenerator {
    reply: Result<String, BackendError>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Self::with(Ok(text.to_string()))
    }

    pub fn failing(err: BackendError) -> Arc<Self> {
        Self::with(Err(err))
    }

    fn with(reply: Result<String, BackendError>) -> Arc<Self> {
        Arc::new(Self { reply, prompts: Mutex::new(Vec::new()) })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone()
    }
}

/// Summarizer that always fails.
#[derive(Default)]
pub struct FailingSummarizer {
    calls: AtomicUsize,
}

impl FailingSummarizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionSummarizer for FailingSummarizer {
    async fn summarize(&self, _record: &DecisionRecord) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("summarization backend unreachable".into())
    }
}

pub fn npi_record() -> DecisionRecord {
    DecisionRecord {
        field: "npi".into(),
        current_value: None,
        candidates: vec!["A".into(), "B".into()],
        chosen_value: Some("A".into()),
        confidence: 0.8357,
        decision: "auto".into(),
    }
}
