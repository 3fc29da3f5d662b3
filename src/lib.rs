//! # taskq
//!
//! Task dispatch pipeline. Tasks move `pending -> in_progress -> done | error`
//! in a Postgres-backed store and are dispatched two ways at once: a
//! periodic scan of pending rows and an AMQP consumer of task-creation
//! events. A compare-and-set on the status column decides which pathway
//! gets to run a task.

pub mod broker;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod model;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod worker;
