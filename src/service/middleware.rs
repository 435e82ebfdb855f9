//! Service middleware and metric events.
//!
//! ## Metrics Exposed
//!
//! - `request` - path, method, status and latency of every request
//! - `canonicalize` - arena size and latency of canonicalize calls
//! - `edit_outcome` - result of every webhook delivery
//!
//! Metrics are structured `tracing` events under the
//! `envelope_kernel::metrics` target, aggregated from logs.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use regex_lite::Regex;
use tracing::info;

use crate::edit::EditOutcome;

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    info!(
        target: "envelope_kernel::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request_metric"
    );

    response
}

/// Collapse per-instance and id segments to keep cardinality low.
fn normalize_path(path: &str) -> String {
    static INSTANCE: OnceLock<Regex> = OnceLock::new();
    static UUID: OnceLock<Regex> = OnceLock::new();

    let instance = INSTANCE.get_or_init(|| {
        Regex::new(r"^/webhook/chatwoot/[^/]+").expect("instance pattern is valid")
    });
    let uuid = UUID.get_or_init(|| {
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("uuid pattern is valid")
    });

    let path = instance.replace(path, "/webhook/chatwoot/:instance");
    uuid.replace_all(&path, ":id").to_string()
}

/// Record one canonicalize call.
pub fn record_canonicalize_metrics(mapping_count: usize, latency_ms: u64) {
    info!(
        target: "envelope_kernel::metrics",
        metric_type = "canonicalize",
        mapping_count = mapping_count,
        latency_ms = latency_ms,
        "canonicalize_metric"
    );
}

/// Record the outcome of a webhook delivery.
pub fn record_edit_outcome(outcome: &EditOutcome) {
    let (result, reason) = match outcome {
        EditOutcome::NotAnEdit => ("not_an_edit", None),
        EditOutcome::Skipped { reason } => ("skipped", Some(reason.to_string())),
        EditOutcome::SendFailed { .. } => ("send_failed", None),
        EditOutcome::Mirrored { .. } => ("mirrored", None),
    };
    info!(
        target: "envelope_kernel::metrics",
        metric_type = "edit_outcome",
        result = result,
        reason = ?reason,
        "edit_outcome_metric"
    );
}
