//! Metric instrument factories for taskq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"taskq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskq")
}

/// Counter: tasks handed to the executor.
/// Labels: `source` ("poller" | "consumer"), `class` ("normal" | "long").
pub fn tasks_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("taskq.task.dispatched")
        .with_description("Number of tasks handed to the executor")
        .build()
}

/// Counter: task status transitions.
/// Labels: `from`, `to`.
pub fn task_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("taskq.task.state_transitions")
        .with_description("Number of task status transitions")
        .build()
}

/// Counter: broker deliveries by outcome.
/// Labels: `disposition` ("ack" | "reject").
pub fn broker_deliveries() -> Counter<u64> {
    meter()
        .u64_counter("taskq.broker.deliveries")
        .with_description("Number of broker deliveries settled")
        .build()
}

/// Counter: broker reconnection attempts after a connection failure.
pub fn broker_reconnects() -> Counter<u64> {
    meter()
        .u64_counter("taskq.broker.reconnects")
        .with_description("Number of broker reconnection attempts")
        .build()
}

/// Histogram: task execution duration in milliseconds.
/// Labels: `class`, `result` ("done" | "error").
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskq.task.duration_ms")
        .with_description("Task execution duration in milliseconds")
        .with_unit("ms")
        .build()
}
