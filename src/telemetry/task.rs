//! Task execution span helpers.

use tracing::Span;

use crate::model::{DurationClass, TaskId};

/// Start a span for one task execution.
///
/// `task.status` is declared empty and filled in by [`record_state_transition`].
pub fn start_task_span(task_id: TaskId, class: DurationClass, source: &str) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.id" = %task_id,
        "task.class" = %class,
        "task.source" = source,
        "task.status" = tracing::field::Empty,
    )
}

/// Record a status transition on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("task.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
