//! Core data model.
//!
//! A task is a unit of work with a persisted identity and a status. The
//! status is the only field the dispatch pipeline ever mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A task tracked by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the store on creation. Immutable.
    pub id: TaskId,

    /// Short human label.
    pub name: String,

    /// Free text.
    pub description: String,

    /// Current lifecycle status.
    pub status: Status,

    pub created_at: DateTime<Utc>,

    /// Last status change, or creation time if the status never changed.
    pub updated_at: DateTime<Utc>,
}

/// Newtype for task ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(TaskId)
            .map_err(|_| Error::Other(format!("invalid task id: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created, waiting for a dispatcher.
    Pending,
    /// Claimed by a worker, work in progress.
    InProgress,
    /// Work finished successfully. Terminal.
    Done,
    /// Work failed. Terminal.
    Error,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, InProgress) | (InProgress, Done) | (InProgress, Error)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Error)
    }

    /// Validate a transition, returning `InvalidTransition` if disallowed.
    pub fn validate_transition(self, to: Status) -> Result<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(Error::InvalidTransition { from: self, to })
        }
    }

    /// Every stored spelling of this status, canonical first. The legacy
    /// form-based deployment wrote human labels into the same column.
    pub fn spellings(self) -> &'static [&'static str] {
        match self {
            Status::Pending => &["pending", "Ожидание"],
            Status::InProgress => &["in_progress", "В работе"],
            Status::Done => &["done", "Готово"],
            Status::Error => &["error", "Ошибка обработки"],
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spellings()[0]
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    /// Accepts the canonical snake_case names and the legacy labels.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        [Status::Pending, Status::InProgress, Status::Done, Status::Error]
            .into_iter()
            .find(|status| status.spellings().contains(&s))
            .ok_or_else(|| Error::Other(format!("unknown task status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Duration class
// ---------------------------------------------------------------------------

/// Execution lane and simulated duration of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    Normal,
    Long,
}

impl DurationClass {
    /// Classify a producer-supplied hint. Anything that is not a long marker
    /// is normal.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(str::trim) {
            Some(h)
                if h.eq_ignore_ascii_case("long")
                    || h.eq_ignore_ascii_case("long-running")
                    || h.eq_ignore_ascii_case("long_running") =>
            {
                DurationClass::Long
            }
            _ => DurationClass::Normal,
        }
    }
}

impl std::fmt::Display for DurationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            DurationClass::Normal => "normal",
            DurationClass::Long => "long",
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatch event
// ---------------------------------------------------------------------------

/// Broker message announcing a task for processing.
///
/// `status_hint` only routes the event; it is never written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDispatchEvent")]
pub struct DispatchEvent {
    pub task_id: TaskId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_hint: Option<String>,
}

/// Wire shape accepted from producers. Older producers send `id` and
/// `status`; some send both spellings, in which case the canonical one wins.
#[derive(Deserialize)]
struct RawDispatchEvent {
    task_id: Option<TaskId>,
    id: Option<TaskId>,
    status_hint: Option<String>,
    status: Option<String>,
}

impl TryFrom<RawDispatchEvent> for DispatchEvent {
    type Error = String;

    fn try_from(raw: RawDispatchEvent) -> std::result::Result<Self, String> {
        let task_id = raw
            .task_id
            .or(raw.id)
            .ok_or_else(|| "missing field `task_id`".to_string())?;
        Ok(Self {
            task_id,
            status_hint: raw.status_hint.or(raw.status),
        })
    }
}

impl DispatchEvent {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            status_hint: None,
        }
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.status_hint = Some(hint.into());
        self
    }

    pub fn duration_class(&self) -> DurationClass {
        DurationClass::from_hint(self.status_hint.as_deref())
    }

    /// Decode a UTF-8 JSON message body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| Error::MalformedEvent(e.to_string()))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Other(format!("encode dispatch event: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for creating new tasks.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) status: Status,
}

impl NewTask {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            status: Status::Pending,
        }
    }

    /// Override the initial status. Only pending tasks are dispatched.
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}
