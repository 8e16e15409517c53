//! Prometheus metrics helpers for the oubliette system.
//!
//! Centralized metrics initialization and the metric descriptions used
//! across the ingestion engine.
//!
//! # Usage
//!
//! ```rust,ignore
//! use oubliette_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize the Prometheus recorder
//!     let handle = init_metrics();
//!
//!     // Start the HTTP server for /metrics endpoint
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     // Now use metrics anywhere in your code
//!     use metrics::{counter, gauge};
//!     counter!("ingest_records_accepted_total").increment(1);
//!     gauge!("ingest_open_streams").set(2.0);
//! }
//! ```
//!
//! # Naming Conventions
//!
//! - Prefix: `ingest_`
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: used only for the skip reason, to keep cardinality flat

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_ingest_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests or optional metrics.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the specified port.
/// This spawns a background task and returns immediately.
///
/// # Arguments
///
/// * `port` - TCP port to listen on (e.g., 9090)
/// * `handle` - Prometheus handle from [`init_metrics`]
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!("metrics server exited: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the ingestion metrics.
///
/// Called automatically by [`init_metrics`].
fn register_ingest_metrics() {
    describe_gauge!(
        "ingest_running",
        "Whether the ingestion engine is currently running (1=yes, 0=no)"
    );

    // =========================================================================
    // File-level metrics
    // =========================================================================

    describe_counter!(
        "ingest_files_done_total",
        "Input files fully processed and marked done"
    );
    describe_counter!(
        "ingest_files_failed_total",
        "Input files abandoned on I/O errors (left in-progress for retry)"
    );

    // =========================================================================
    // Record-level metrics
    // =========================================================================

    describe_counter!(
        "ingest_records_accepted_total",
        "Records parsed, hashed and routed to a shard"
    );
    describe_counter!(
        "ingest_lines_skipped_total",
        "Input lines skipped (label: reason)"
    );

    // =========================================================================
    // Shard stream metrics
    // =========================================================================

    describe_gauge!("ingest_open_streams", "Currently open shard writers");
    describe_counter!("ingest_stream_opens_total", "Shard writer opens");
    describe_counter!(
        "ingest_stream_evictions_total",
        "Shard writers closed by LRU eviction"
    );
    describe_counter!("ingest_batch_flushes_total", "Shard writer batch flushes");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    // Ensure metrics are initialized exactly once for all tests
    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        // First call may or may not succeed (depends on test order)
        let handle1 = try_init_metrics();

        // Second call should definitely return None (already installed)
        let handle2 = try_init_metrics();

        // At most one should succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_register_does_not_panic() {
        ensure_metrics_init();
        // Idempotent
        register_ingest_metrics();
        register_ingest_metrics();
    }

    #[test]
    fn test_recording_does_not_panic() {
        ensure_metrics_init();
        metrics::counter!("ingest_records_accepted_total").increment(1);
        metrics::counter!("ingest_lines_skipped_total", "reason" => "empty").increment(1);
        metrics::gauge!("ingest_open_streams").set(0.0);
    }
}
