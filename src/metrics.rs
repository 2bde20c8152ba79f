// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for local-state.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `local_state_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `engine`: sync, async
//! - `operation`: get, multi_get, set, remove, load
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record an engine operation outcome
pub fn record_operation(engine: &str, operation: &str, status: &str) {
    counter!(
        "local_state_operations_total",
        "engine" => engine.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the outcome of `result` for an engine operation
pub fn record_result<T, E>(engine: &str, operation: &str, result: &Result<T, E>) {
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation(engine, operation, status);
}

/// Record subscriber callbacks that completed for one event
pub fn record_notifications(kind: &str, delivered: usize) {
    counter!(
        "local_state_notifications_total",
        "kind" => kind.to_string()
    )
    .increment(delivered as u64);
}

/// Record a subscriber callback that panicked during delivery
pub fn record_subscriber_panic(kind: &str) {
    counter!(
        "local_state_subscriber_panics_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Set current sync-engine cache entry count
pub fn set_cache_entries(count: usize) {
    gauge!("local_state_cache_entries").set(count as f64);
}

/// Record a completed (or failed) bulk load
pub fn record_load(status: &str, keys: usize, duration: Duration) {
    counter!(
        "local_state_loads_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("local_state_load_keys").record(keys as f64);
    histogram!("local_state_load_seconds").record(duration.as_secs_f64());
}

/// Record a detached write that failed after the cache was already updated
pub fn record_detached_write_failure(operation: &str) {
    counter!(
        "local_state_detached_write_failures_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}
