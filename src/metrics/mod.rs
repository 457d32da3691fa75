//! Prometheus metrics for the edgepool coordinator
//!
//! Tracks node presence, queue depth, the task lifecycle (submission,
//! assignment, results, requeues) and API traffic.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct CoordinatorMetrics {
    registered_nodes: Gauge,
    connected_nodes: Gauge,
    queue_depth: Gauge,
    tasks_submitted: CounterVec,
    tasks_assigned: CounterVec,
    task_results: CounterVec,
    requeues: CounterVec,
    stale_results: Counter,
    protocol_errors: CounterVec,
    api_requests: CounterVec,
    api_duration: HistogramVec,
}

static METRICS: OnceLock<Option<CoordinatorMetrics>> = OnceLock::new();

fn metrics() -> Option<&'static CoordinatorMetrics> {
    METRICS.get().and_then(Option::as_ref)
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
/// Concurrent callers wait for the first registration to finish.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let registered = METRICS.get_or_init(|| match register_all() {
        Ok(metrics) => {
            tracing::info!("Prometheus metrics initialized successfully");
            Some(metrics)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register metrics; recording disabled");
            None
        }
    });

    match registered {
        Some(_) => Ok(()),
        None => Err("Coordinator metrics registration failed".into()),
    }
}

fn register_all() -> Result<CoordinatorMetrics, prometheus::Error> {
    Ok(CoordinatorMetrics {
        registered_nodes: register_gauge!(
            "edgepool_registered_nodes",
            "Number of nodes known to the registry"
        )?,
        connected_nodes: register_gauge!(
            "edgepool_connected_nodes",
            "Number of nodes with a live connection"
        )?,
        queue_depth: register_gauge!(
            "edgepool_queue_depth",
            "Number of pending tasks waiting for a worker"
        )?,
        tasks_submitted: register_counter_vec!(
            "edgepool_tasks_submitted_total",
            "Tasks accepted by the submission API",
            &["kind"]
        )?,
        tasks_assigned: register_counter_vec!(
            "edgepool_tasks_assigned_total",
            "Tasks handed to a worker",
            &["kind"]
        )?,
        task_results: register_counter_vec!(
            "edgepool_task_results_total",
            "Task results accepted, by outcome",
            &["outcome"]
        )?,
        requeues: register_counter_vec!(
            "edgepool_task_requeues_total",
            "Assigned tasks returned to the queue",
            &["reason"]
        )?,
        stale_results: register_counter!(
            "edgepool_stale_results_total",
            "Results rejected because the task was no longer assigned to the sender"
        )?,
        protocol_errors: register_counter_vec!(
            "edgepool_protocol_errors_total",
            "Worker connections dropped for protocol violations",
            &["kind"]
        )?,
        api_requests: register_counter_vec!(
            "edgepool_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "edgepool_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
        )?,
    })
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    metrics().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// Recorders
// ============================================================================

pub fn set_node_counts(connected: usize, registered: usize) {
    if let Some(m) = metrics() {
        m.connected_nodes.set(connected as f64);
        m.registered_nodes.set(registered as f64);
    }
}

pub fn set_queue_depth(depth: usize) {
    if let Some(m) = metrics() {
        m.queue_depth.set(depth as f64);
    }
}

pub fn record_task_submitted(kind: &str) {
    if let Some(m) = metrics() {
        m.tasks_submitted.with_label_values(&[kind]).inc();
    }
}

pub fn record_task_assigned(kind: &str) {
    if let Some(m) = metrics() {
        m.tasks_assigned.with_label_values(&[kind]).inc();
    }
}

/// Record an accepted result (`completed` or `failed`)
pub fn record_task_result(outcome: &str) {
    if let Some(m) = metrics() {
        m.task_results.with_label_values(&[outcome]).inc();
    }
}

pub fn record_requeue(reason: &str) {
    if let Some(m) = metrics() {
        m.requeues.with_label_values(&[reason]).inc();
    }
}

pub fn record_stale_result() {
    if let Some(m) = metrics() {
        m.stale_results.inc();
    }
}

pub fn record_protocol_error(kind: &str) {
    if let Some(m) = metrics() {
        m.protocol_errors.with_label_values(&[kind]).inc();
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = metrics() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_task_submitted("prime_calculation");
        set_queue_depth(4);

        let text = encode_metrics().unwrap();
        assert!(text.contains("edgepool_tasks_submitted_total"));
        assert!(text.contains("edgepool_queue_depth"));
    }

    #[test]
    fn test_task_lifecycle_recording() {
        ensure_metrics_initialized();
        record_task_assigned("hash_computation");
        record_task_result("completed");
        record_task_result("failed");
        record_requeue("node_lost");
        record_stale_result();
        record_protocol_error("malformed");
        set_node_counts(2, 3);
        record_api_request("/submit_task", 200, 0.002);
    }
}
