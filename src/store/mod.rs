//! Task store contract.
//!
//! The store is the single source of truth for task status. Every writer
//! goes through [`TaskStore::compare_and_set`], which validates the move
//! against the status state machine and applies it only if the stored
//! status still matches the caller's expectation.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{NewTask, Status, Task, TaskId};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task. The store assigns the id.
    async fn create(&self, new: NewTask) -> Result<Task>;

    /// Fetch a task, `NotFound` if absent.
    async fn get(&self, id: TaskId) -> Result<Task>;

    /// All tasks in creation order.
    async fn list(&self) -> Result<Vec<Task>>;

    /// Tasks currently in `status`, in creation order.
    async fn list_by_status(&self, status: Status) -> Result<Vec<Task>>;

    /// Remove a task, `NotFound` if absent.
    async fn delete(&self, id: TaskId) -> Result<()>;

    /// Atomically move `id` from `expected` to `next`.
    ///
    /// Returns `Ok(false)` when the stored status is not `expected` (another
    /// writer got there first), `NotFound` when the row is gone and
    /// `InvalidTransition` when `expected -> next` is not a legal move.
    async fn compare_and_set(&self, id: TaskId, expected: Status, next: Status) -> Result<bool>;

    /// Move `id` to `next` from whatever status it currently holds, provided
    /// that move is legal.
    async fn set_status(&self, id: TaskId, next: Status) -> Result<Task> {
        let current = self.get(id).await?.status;
        current.validate_transition(next)?;
        if self.compare_and_set(id, current, next).await? {
            return self.get(id).await;
        }
        // Lost a race: report against the status that beat us.
        let actual = self.get(id).await?.status;
        Err(Error::InvalidTransition {
            from: actual,
            to: next,
        })
    }
}
