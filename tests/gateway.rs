mod common;

use common::test_helpers::{npi_record, FailingSummarizer, ScriptedGenerator};
use std::sync::Arc;
use std::time::Duration;
use turnstile::chat::DEFAULT_UNAVAILABLE_MESSAGE;
use turnstile::telemetry::{AdmissionEvent, GatewayEvent, MemorySink};
use turnstile::{
    ApiKey, BackendError, Capability, Gateway, GatewayConfig, GatewayError, ManualClock,
    TextGenerator,
};

fn config() -> GatewayConfig {
    GatewayConfig::from_json_str(
        r#"{ "explain": { "quota": 2, "window_secs": 10 }, "chat": { "quota": 3, "window_secs": 10 } }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn explain_and_chat_registries_are_independent() {
    let clock = ManualClock::new();
    let gateway = Gateway::builder(config())
        .generator(ScriptedGenerator::replying("hi"))
        .summarizer(Arc::new(FailingSummarizer::default()))
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    gateway.explain("ip", &npi_record()).await.unwrap();
    gateway.explain("ip", &npi_record()).await.unwrap();
    assert!(gateway.explain("ip", &npi_record()).await.unwrap_err().is_rate_limited());

    for _ in 0..3 {
        assert_eq!(gateway.chat("ip", "hello", &[]).await.unwrap(), "hi");
    }
    let err = gateway.chat("ip", "hello", &[]).await.unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited { capability: Capability::Chat, .. }));

    clock.advance(Duration::from_secs(10));
    assert!(gateway.explain("ip", &npi_record()).await.is_ok());
    assert!(gateway.chat("ip", "hello", &[]).await.is_ok());
}

#[tokio::test]
async fn missing_credential_keeps_chat_responsive() {
    let gateway = Gateway::builder(config())
        .connect_with(None, |_key| ScriptedGenerator::replying("never used") as Arc<dyn TextGenerator>)
        .build()
        .unwrap();

    assert_eq!(gateway.chat("ip", "hello", &[]).await.unwrap(), DEFAULT_UNAVAILABLE_MESSAGE);
    // Explain falls back to the template through the same unconfigured backend.
    let text = gateway.explain("ip", &npi_record()).await.unwrap();
    assert_eq!(text, "Decision for npi: chose A with confidence 0.84 from sources ['A', 'B'].");
}

#[tokio::test]
async fn credential_is_handed_to_the_connector() {
    let generator = ScriptedGenerator::replying("connected");
    let seen = Arc::new(std::sync::Mutex::new(None));
    let seen_in = seen.clone();
    let gateway = Gateway::builder(config())
        .connect_with(ApiKey::new("k-123"), move |key| {
            *seen_in.lock().unwrap() = Some(key.expose().to_string());
            generator as Arc<dyn TextGenerator>
        })
        .build()
        .unwrap();

    assert_eq!(gateway.chat("ip", "hello", &[]).await.unwrap(), "connected");
    assert_eq!(seen.lock().unwrap().as_deref(), Some("k-123"));
}

#[tokio::test]
async fn upstream_quota_surfaces_on_chat_only() {
    let gateway = Gateway::builder(config())
        .generator(ScriptedGenerator::failing(BackendError::QuotaExhausted))
        .build()
        .unwrap();

    assert_eq!(
        gateway.chat("ip", "hello", &[]).await.unwrap_err(),
        GatewayError::UpstreamQuotaExhausted
    );
    assert!(gateway.explain("ip", &npi_record()).await.is_ok());
}

#[tokio::test]
async fn events_flow_to_the_configured_sink() {
    let sink = MemorySink::new();
    let gateway = Gateway::builder(config())
        .generator(ScriptedGenerator::replying("hi"))
        .sink(sink.clone())
        .build()
        .unwrap();

    gateway.chat("ip", "hello", &[]).await.unwrap();
    let events = sink.events();
    assert_eq!(
        events[0],
        GatewayEvent::Admission(AdmissionEvent::Admitted { capability: Capability::Chat, remaining: 2 })
    );
    assert!(matches!(events[1], GatewayEvent::Invocation(_)));
}

#[tokio::test(start_paused = true)]
async fn maintenance_evicts_idle_windows() {
    let clock = ManualClock::new();
    let cfg = GatewayConfig { sweep_interval_secs: Some(30), ..config() };
    let gateway = Gateway::builder(cfg)
        .generator(ScriptedGenerator::replying("hi"))
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    gateway.chat("ip", "hello", &[]).await.unwrap();
    assert_eq!(gateway.chat_registry().client_count(), 1);

    let handles = gateway.spawn_maintenance();
    assert_eq!(handles.len(), 2);

    clock.advance(Duration::from_secs(11));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(gateway.chat_registry().client_count(), 0);
}

#[test]
fn maintenance_is_off_by_default() {
    let gateway = Gateway::from_config(GatewayConfig::default()).unwrap();
    assert!(gateway.spawn_maintenance().is_empty());
}

#[test]
fn invalid_config_fails_the_build() {
    let cfg = GatewayConfig { chat: turnstile::config::LimitConfig { quota: 0, window_secs: 60 }, ..GatewayConfig::default() };
    let err = Gateway::from_config(cfg).err().unwrap();
    assert!(err.to_string().starts_with("invalid chat limits"));
}

// Registry access must not depend on the sink type's capabilities.
fn registries<S>(gateway: &Gateway<S>) -> (usize, usize) {
    (gateway.explain_registry().client_count(), gateway.chat_registry().client_count())
}

#[tokio::test]
async fn registry_accessors_work_for_any_sink() {
    let gateway = Gateway::builder(config())
        .generator(ScriptedGenerator::replying("hi"))
        .sink(MemorySink::new())
        .build()
        .unwrap();
    gateway.chat("ip", "hello", &[]).await.unwrap();
    assert_eq!(registries(&gateway), (0, 1));
}

#[tokio::test]
async fn enormous_configured_window_rejects_instead_of_panicking() {
    let cfg = GatewayConfig::from_json_str(
        r#"{ "chat": { "quota": 1, "window_secs": 18446744073709551615 } }"#,
    )
    .unwrap();
    let gateway = Gateway::builder(cfg)
        .generator(ScriptedGenerator::replying("hi"))
        .build()
        .unwrap();

    assert_eq!(gateway.chat("ip", "hello", &[]).await.unwrap(), "hi");
    let err = gateway.chat("ip", "hello", &[]).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(u64::MAX)));
}
