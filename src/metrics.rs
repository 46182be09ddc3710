// metrics.rs
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::{sync::OnceLock, time::Duration};

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();
pub static REQUEST_DURATION: OnceLock<HistogramVec> = OnceLock::new();
pub static VOLUME_USAGE_BYTES: OnceLock<GaugeVec> = OnceLock::new();
pub static MEASUREMENT_FAILURES: OnceLock<Counter> = OnceLock::new();
pub static CONTAINERS_SKIPPED: OnceLock<Counter> = OnceLock::new();

pub fn initialize_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }
    let registry = Registry::new();

    let requests_total = CounterVec::new(
        Opts::new("volstat_requests_total", "Total HTTP requests served"),
        &["route", "status"],
    )?;
    registry.register(Box::new(requests_total.clone()))?;

    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "volstat_request_duration_seconds",
            "Time taken to build a usage report",
        ),
        &["route"],
    )?;
    registry.register(Box::new(request_duration.clone()))?;

    let volume_usage = GaugeVec::new(
        Opts::new(
            "volstat_volume_usage_bytes",
            "Last measured size of a volume in bytes",
        ),
        &["volume"],
    )?;
    registry.register(Box::new(volume_usage.clone()))?;

    let measurement_failures = Counter::new(
        "volstat_measurement_failures_total",
        "Volume measurements that failed and were reported as zero",
    )?;
    registry.register(Box::new(measurement_failures.clone()))?;

    let containers_skipped = Counter::new(
        "volstat_containers_skipped_total",
        "Containers skipped because they could not be inspected",
    )?;
    registry.register(Box::new(containers_skipped.clone()))?;

    let _ = REQUESTS_TOTAL.set(requests_total);
    let _ = REQUEST_DURATION.set(request_duration);
    let _ = VOLUME_USAGE_BYTES.set(volume_usage);
    let _ = MEASUREMENT_FAILURES.set(measurement_failures);
    let _ = CONTAINERS_SKIPPED.set(containers_skipped);
    let _ = REGISTRY.set(registry);

    Ok(())
}

pub fn record_request(route: &str, status: StatusCode, elapsed: Duration) {
    if let Some(requests) = REQUESTS_TOTAL.get() {
        requests
            .with_label_values(&[route, status.as_str()])
            .inc();
    }
    if let Some(durations) = REQUEST_DURATION.get() {
        durations
            .with_label_values(&[route])
            .observe(elapsed.as_secs_f64());
    }
}

pub fn record_volume_usage(volume: &str, bytes: u64) {
    if let Some(usage) = VOLUME_USAGE_BYTES.get() {
        usage.with_label_values(&[volume]).set(bytes as f64);
    }
}

/// Drops every volume label so volumes that no longer exist stop being exported.
pub fn reset_volume_usage() {
    if let Some(usage) = VOLUME_USAGE_BYTES.get() {
        usage.reset();
    }
}

pub fn record_measurement_failure() {
    if let Some(failures) = MEASUREMENT_FAILURES.get() {
        failures.inc();
    }
}

pub fn record_container_skipped() {
    if let Some(skipped) = CONTAINERS_SKIPPED.get() {
        skipped.inc();
    }
}

// Handler for metrics endpoint with timeout
pub async fn metrics_handler() -> Response {
    use tokio::time::timeout;

    match timeout(Duration::from_secs(5), collect_metrics()).await {
        Ok(result) => result,
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics collection timed out".to_string(),
        )
            .into_response(),
    }
}

async fn collect_metrics() -> Response {
    let Some(registry) = REGISTRY.get() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics registry not initialized".to_string(),
        )
            .into_response();
    };

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(metrics_text) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                metrics_text,
            )
                .into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Failed to convert metrics to UTF-8: {}", e),
            )
                .into_response(),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}
