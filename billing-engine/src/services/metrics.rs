//! Prometheus metrics for the billing engine.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Store query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "billing_db_query_duration_seconds",
            "Store query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Rollup unit counter, per (day, service) outcome
pub static ROLLUP_UNITS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Fact rows written by the rollup
pub static FACTS_UPSERTED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage queries served
pub static USAGE_QUERIES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    ROLLUP_UNITS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_rollup_units_total",
                "Rollup (day, service) units processed, by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register ROLLUP_UNITS_TOTAL")
    });

    FACTS_UPSERTED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_facts_upserted_total",
                "Daily usage fact rows written, by channel"
            ),
            &["channel"]
        )
        .expect("Failed to register FACTS_UPSERTED_TOTAL")
    });

    USAGE_QUERIES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_usage_queries_total", "Usage queries served"),
            &["query"]
        )
        .expect("Failed to register USAGE_QUERIES_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record one processed rollup unit.
pub fn record_rollup_unit(outcome: &str) {
    if let Some(counter) = ROLLUP_UNITS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record fact rows written for a channel.
pub fn record_facts_upserted(channel: &str, count: u64) {
    if let Some(counter) = FACTS_UPSERTED_TOTAL.get() {
        counter.with_label_values(&[channel]).inc_by(count);
    }
}

/// Record a served usage query.
pub fn record_usage_query(query: &str) {
    if let Some(counter) = USAGE_QUERIES_TOTAL.get() {
        counter.with_label_values(&[query]).inc();
    }
}
