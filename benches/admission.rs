use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use std::sync::Arc;
use tower::{Layer, Service};
use turnstile::{RateLimitLayer, RateLimitRegistry, WindowLimits};

// Echoes the request back; lets the middleware overhead dominate.
#[derive(Clone)]
struct EchoService;

impl Service<&'static str> for EchoService {
    type Response = &'static str;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: &'static str) -> Self::Future {
        futures::future::ready(Ok(req))
    }
}

fn admit_single_identity(c: &mut Criterion) {
    // Saturated after the first few calls, so this measures the reject path.
    let registry = RateLimitRegistry::new("bench", WindowLimits::per_seconds(5, 60).unwrap());

    c.bench_function("admit_single_identity_saturated", |b| {
        b.iter(|| black_box(registry.admit(black_box("203.0.113.7"))));
    });
}

fn admit_many_identities(c: &mut Criterion) {
    let registry = RateLimitRegistry::new("bench", WindowLimits::per_seconds(1_000, 60).unwrap());
    let identities: Vec<String> = (0..10_000).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
    let mut next = 0usize;

    c.bench_function("admit_10k_identities_round_robin", |b| {
        b.iter(|| {
            let identity = &identities[next % identities.len()];
            next += 1;
            black_box(registry.admit(black_box(identity)))
        });
    });
}

fn middleware_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = Arc::new(RateLimitRegistry::new("bench", WindowLimits::per_seconds(5, 60).unwrap()));
    let svc = RateLimitLayer::new(registry, |req: &&'static str| req.to_string()).layer(EchoService);

    c.bench_function("rate_limit_layer_call", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box("request"))).await;
        });
    });
}

criterion_group!(benches, admit_single_identity, admit_many_identities, middleware_throughput);
criterion_main!(benches);
