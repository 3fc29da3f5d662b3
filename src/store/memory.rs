//! In-process task store.
//!
//! Used by tests and by `taskq serve --memory`. A single mutex guards the
//! map; each operation holds it for one row read-modify-write and never
//! across an await.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::TaskStore;
use crate::error::{Error, Result};
use crate::model::{NewTask, Status, Task, TaskId};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: i64,
    tasks: BTreeMap<TaskId, Task>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, new: NewTask) -> Result<Task> {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let now = Utc::now();
        let task = Task {
            id: TaskId(inner.last_id),
            name: new.name,
            description: new.description,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        self.inner
            .lock()
            .tasks
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Task>> {
        Ok(self.inner.lock().tasks.values().cloned().collect())
    }

    async fn list_by_status(&self, status: Status) -> Result<Vec<Task>> {
        Ok(self
            .inner
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        self.inner
            .lock()
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound(id))
    }

    async fn compare_and_set(&self, id: TaskId, expected: Status, next: Status) -> Result<bool> {
        expected.validate_transition(next)?;

        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(&id).ok_or(Error::NotFound(id))?;
        if task.status != expected {
            return Ok(false);
        }
        task.status = next;
        task.updated_at = Utc::now();
        Ok(true)
    }
}
