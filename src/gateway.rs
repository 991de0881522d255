//! Composition of the explain and chat operations behind their own registries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{
    ApiKey, DecisionSummarizer, GeneratorSummarizer, TextGenerator, Unconfigured,
};
use crate::chat::{ChatService, ChatTurn};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{ConfigError, GatewayConfig};
use crate::error::{Capability, GatewayError};
use crate::explain::{DecisionRecord, ExplainService};
use crate::invoker::ResilientInvoker;
use crate::rate_limit::RateLimitRegistry;
use crate::telemetry::{NullSink, TelemetrySink};

/// Request-handling core: admission control plus resilient backend access.
///
/// The explain and chat registries are separate objects; traffic on one never consumes
/// quota on the other.
pub struct Gateway<S = NullSink> {
    explain: ExplainService<S>,
    chat: ChatService<S>,
    sweep_interval: Option<Duration>,
}

impl Gateway<NullSink> {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder<NullSink> {
        GatewayBuilder {
            config,
            generator: None,
            summarizer: None,
            credential: None,
            clock: Arc::new(MonotonicClock),
            sink: NullSink,
        }
    }

    /// A gateway with no backend wired in: chat answers with the unavailable message and
    /// explain serves the templated fallback. Use [`builder`](Self::builder) to attach one.
    pub fn from_config(config: GatewayConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }
}

impl<S> Gateway<S> {
    pub fn explain_registry(&self) -> &Arc<RateLimitRegistry> {
        self.explain.registry()
    }

    pub fn chat_registry(&self) -> &Arc<RateLimitRegistry> {
        self.chat.registry()
    }

    /// Start idle-window sweepers when a sweep interval is configured.
    ///
    /// Must be called from within a tokio runtime. The tasks end when the gateway is dropped.
    pub fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        match self.sweep_interval {
            Some(every) => vec![
                self.explain_registry().spawn_sweeper(every),
                self.chat_registry().spawn_sweeper(every),
            ],
            None => Vec::new(),
        }
    }
}

impl<S> Gateway<S>
where
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Inbound "explain": fails only with [`GatewayError::RateLimited`].
    pub async fn explain(&self, identity: &str, record: &DecisionRecord) -> Result<String, GatewayError> {
        self.explain.explain(identity, record).await
    }

    /// Inbound "chat": fails with [`GatewayError::RateLimited`] or
    /// [`GatewayError::UpstreamQuotaExhausted`].
    pub async fn chat(
        &self,
        identity: &str,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, GatewayError> {
        self.chat.chat(identity, message, history).await
    }
}

/// Wires a [`Gateway`] from configuration and collaborators.
pub struct GatewayBuilder<S = NullSink> {
    config: GatewayConfig,
    generator: Option<Arc<dyn TextGenerator>>,
    summarizer: Option<Arc<dyn DecisionSummarizer>>,
    credential: Option<ApiKey>,
    clock: Arc<dyn Clock>,
    sink: S,
}

impl<S> GatewayBuilder<S> {
    /// Backend used by chat, and by explain unless a summarizer is set.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the generator from the credential in the configured environment variable.
    ///
    /// Without a credential the gateway gets a generator that reports "not configured".
    pub fn connect_from_env<F>(self, connect: F) -> Self
    where
        F: FnOnce(&ApiKey) -> Arc<dyn TextGenerator>,
    {
        let var = self.config.credential_env.clone();
        self.connect_with(ApiKey::from_env(&var), connect)
    }

    /// Same as [`connect_from_env`](Self::connect_from_env) with an explicit credential.
    pub fn connect_with<F>(mut self, credential: Option<ApiKey>, connect: F) -> Self
    where
        F: FnOnce(&ApiKey) -> Arc<dyn TextGenerator>,
    {
        match credential {
            Some(key) => {
                self.generator = Some(connect(&key));
                self.credential = Some(key);
            }
            None => {
                warn!(
                    target: "turnstile::gateway",
                    var = %self.config.credential_env,
                    "no backend credential; chat will answer with the unavailable message"
                );
                self.generator = Some(Arc::new(Unconfigured::missing_env(&self.config.credential_env)));
                self.credential = None;
            }
        }
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn DecisionSummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink<T>(self, sink: T) -> GatewayBuilder<T> {
        GatewayBuilder {
            config: self.config,
            generator: self.generator,
            summarizer: self.summarizer,
            credential: self.credential,
            clock: self.clock,
            sink,
        }
    }
}

impl<S: Clone> GatewayBuilder<S> {
    pub fn build(self) -> Result<Gateway<S>, ConfigError> {
        let cfg = &self.config;
        let explain_limits = cfg.explain_limits()?;
        let chat_limits = cfg.chat_limits()?;
        let timeout = cfg.upstream_timeout()?;
        let sweep_interval = cfg.sweep_interval()?;

        let generator: Arc<dyn TextGenerator> = match self.generator {
            Some(generator) => generator,
            None => Arc::new(Unconfigured::missing_env(&cfg.credential_env)),
        };
        let summarizer: Arc<dyn DecisionSummarizer> = match self.summarizer {
            Some(summarizer) => summarizer,
            None => Arc::new(GeneratorSummarizer::new(generator.clone())),
        };

        let explain_registry = Arc::new(RateLimitRegistry::with_clock(
            Capability::Explain.as_str(),
            explain_limits,
            self.clock.clone(),
        ));
        let chat_registry = Arc::new(RateLimitRegistry::with_clock(
            Capability::Chat.as_str(),
            chat_limits,
            self.clock.clone(),
        ));

        let mut invoker = ResilientInvoker::new(generator).with_sink(self.sink.clone());
        let mut explain = ExplainService::new(explain_registry, summarizer).with_sink(self.sink.clone());
        if let Some(key) = &self.credential {
            invoker = invoker.redact_key(key);
            explain = explain.redact_key(key);
        }
        if let Some(policy) = timeout {
            invoker = invoker.with_timeout(policy);
            explain = explain.with_timeout(policy);
        }

        let chat = ChatService::new(chat_registry, Arc::new(invoker), self.sink)
            .with_template(cfg.prompt_template())
            .with_replies(cfg.degraded_replies());

        info!(
            target: "turnstile::gateway",
            explain_quota = explain_limits.quota(),
            explain_window = ?explain_limits.window(),
            chat_quota = chat_limits.quota(),
            chat_window = ?chat_limits.window(),
            upstream_timeout = ?timeout.map(|t| t.duration()),
            "gateway configured"
        );

        Ok(Gateway { explain, chat, sweep_interval })
    }
}
