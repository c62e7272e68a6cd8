use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Request counters
pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_requests_total", "Total number of proxied requests"),
        &["method", "status"],
    )
    .unwrap()
});

pub static AUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gateway_auth_failures_total",
            "Requests rejected before reaching upstream",
        ),
        &["reason"],
    )
    .unwrap()
});

pub static SANDBOX_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_sandbox_requests_total",
        "Requests made with the sandbox token",
    )
    .unwrap()
});

// Metering
pub static CREDITS_CONSUMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_credits_consumed_total",
        "Credits deducted for successful calls",
    )
    .unwrap()
});

pub static METERING_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gateway_metering_failures_total",
            "Post-flight metering steps that did not complete",
        ),
        &["stage"],
    )
    .unwrap()
});

// Upstream
pub static UPSTREAM_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gateway_upstream_latency_seconds",
            "Upstream round trip latency",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap()
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY.register(Box::new(REQUESTS_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(AUTH_FAILURES.clone())).unwrap();
        REGISTRY
            .register(Box::new(SANDBOX_REQUESTS.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(CREDITS_CONSUMED.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(METERING_FAILURES.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(UPSTREAM_LATENCY.clone()))
            .unwrap();
    });
}
