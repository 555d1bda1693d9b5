//! Metrics and observability utilities
//!
//! Counters and histograms for the ingestion pipeline, named under a common
//! prefix. No exporter is installed here; without a recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Satlas metrics
pub const METRICS_PREFIX: &str = "satlas";

/// Register all metric descriptions
pub fn register_metrics() {
    // Catalog metrics
    describe_counter!(
        format!("{}_catalog_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total catalog API requests by endpoint and status"
    );

    describe_histogram!(
        format!("{}_catalog_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Catalog API request latency in seconds"
    );

    describe_counter!(
        format!("{}_catalog_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Catalog requests retried after HTTP 429"
    );

    describe_counter!(
        format!("{}_catalog_pages_total", METRICS_PREFIX),
        Unit::Count,
        "Search result pages fetched"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_features_fetched_total", METRICS_PREFIX),
        Unit::Count,
        "Raw features received from the catalog"
    );

    describe_counter!(
        format!("{}_features_rejected_total", METRICS_PREFIX),
        Unit::Count,
        "Features dropped by reason"
    );

    describe_counter!(
        format!("{}_entities_written_total", METRICS_PREFIX),
        Unit::Count,
        "Entity upserts by entity type and outcome"
    );

    // Reference metrics
    describe_counter!(
        format!("{}_reference_rows_imported_total", METRICS_PREFIX),
        Unit::Count,
        "Static reference rows imported by table"
    );

    tracing::info!("Metrics registered");
}

/// Times one catalog request
pub struct CatalogRequestTimer {
    start: Instant,
    endpoint: &'static str,
}

impl CatalogRequestTimer {
    pub fn start(endpoint: &'static str) -> Self {
        Self {
            start: Instant::now(),
            endpoint,
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_catalog_requests_total", METRICS_PREFIX),
            "endpoint" => self.endpoint,
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_catalog_request_duration_seconds", METRICS_PREFIX),
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_retry(endpoint: &'static str) {
    counter!(
        format!("{}_catalog_retries_total", METRICS_PREFIX),
        "endpoint" => endpoint
    )
    .increment(1);
}

/// Helper to record one fetched search page
pub fn record_page(feature_count: usize) {
    counter!(format!("{}_catalog_pages_total", METRICS_PREFIX)).increment(1);
    counter!(format!("{}_features_fetched_total", METRICS_PREFIX)).increment(feature_count as u64);
}

pub fn record_rejection(reason: &'static str) {
    counter!(
        format!("{}_features_rejected_total", METRICS_PREFIX),
        "reason" => reason
    )
    .increment(1);
}

/// Helper to record an entity upsert
pub fn record_write(entity: &'static str, inserted: bool) {
    let outcome = if inserted { "inserted" } else { "skipped" };

    counter!(
        format!("{}_entities_written_total", METRICS_PREFIX),
        "entity" => entity,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_reference_import(table: &'static str, rows: usize) {
    counter!(
        format!("{}_reference_rows_imported_total", METRICS_PREFIX),
        "table" => table
    )
    .increment(rows as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        let timer = CatalogRequestTimer::start("quick-search");
        timer.finish(200);
        record_retry("quick-search");
        record_page(3);
        record_rejection("geometry_rejected");
        record_write("sat_images", true);
        record_reference_import("countries", 10);
        // Just verify it runs without panic
    }
}
