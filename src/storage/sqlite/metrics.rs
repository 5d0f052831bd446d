//! Store operation metrics.

use std::time::Instant;

/// Records the count and latency of one store operation.
///
/// Emits `cache_store_operations_total` and `cache_store_operation_duration_ms`,
/// both labelled by backend, operation and status (`success` / `error`).
pub fn record_store_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "cache_store_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "cache_store_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Records metrics for `result` and passes it through.
pub fn observe<T, E>(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    result: Result<T, E>,
) -> Result<T, E> {
    let status = if result.is_ok() { "success" } else { "error" };
    record_store_metrics(backend, operation, start, status);
    result
}
