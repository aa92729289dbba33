// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Report pipeline --------
pub static REPORTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reports_total",
            "report requests by outcome (ok, empty, upstream_unavailable, cancelled)",
        ),
        &["outcome"],
    )
    .unwrap()
});

pub static REPORT_ROWS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("report_rows_total", "item rows emitted").unwrap());

pub static ENRICH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enrich_failures_total", "per-item enrichment failures (label: stage)"),
        &["stage"],
    )
    .unwrap()
});

pub static NUMERIC_SKIPS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("numeric_skips_total", "rows whose quantity/income stayed out of totals").unwrap()
});

// Upstream call latency (milliseconds), per call kind
pub static UPSTREAM_LAT: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("upstream_latency_ms", "upstream call latency (ms)")
            .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]),
        &["call"],
    )
    .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_ENRICH_CONCURRENCY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("config_enrich_concurrency", "bounded fan-out width for rating enrichment").unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; double registration is harmless here
    for m in [
        REGISTRY.register(Box::new(REPORTS.clone())),
        REGISTRY.register(Box::new(REPORT_ROWS.clone())),
        REGISTRY.register(Box::new(ENRICH_FAILURES.clone())),
        REGISTRY.register(Box::new(NUMERIC_SKIPS.clone())),
        REGISTRY.register(Box::new(UPSTREAM_LAT.clone())),
        REGISTRY.register(Box::new(CONFIG_ENRICH_CONCURRENCY.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}
