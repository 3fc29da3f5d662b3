//! Error types for taskq.

use thiserror::Error;

use crate::model::{Status, TaskId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("malformed dispatch event: {0}")]
    MalformedEvent(String),

    #[error("broker connection failure: {0}")]
    Connection(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
