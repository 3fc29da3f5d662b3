//! Task row operations.
//!
//! Status writes are single-row conditional updates; Postgres row locking
//! makes them safe against both dispatchers racing on the same task.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{NewTask, Status, Task, TaskId};
use crate::store::TaskStore;

impl super::Db {
    async fn exists(&self, id: TaskId) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM tasks WHERE id = $1)")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl TaskStore for super::Db {
    async fn create(&self, new: NewTask) -> Result<Task> {
        let now = chrono::Utc::now();
        let row: TaskRow = sqlx::query_as(
            "INSERT INTO tasks (name, description, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING id, name, description, status, created_at, updated_at",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into_task()
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, name, description, status, created_at, updated_at
             FROM tasks WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(Error::NotFound(id))?.try_into_task()
    }

    async fn list(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, name, description, status, created_at, updated_at
             FROM tasks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    async fn list_by_status(&self, status: Status) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, name, description, status, created_at, updated_at FROM tasks
             WHERE status = ANY($1) ORDER BY id",
        )
        .bind(status.spellings())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    async fn compare_and_set(&self, id: TaskId, expected: Status, next: Status) -> Result<bool> {
        expected.validate_transition(next)?;

        let rows_affected = sqlx::query(
            "UPDATE tasks SET status = $1, updated_at = $2
             WHERE id = $3 AND status = ANY($4)",
        )
        .bind(next.as_str())
        .bind(chrono::Utc::now())
        .bind(id.0)
        .bind(expected.spellings())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected > 0 {
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(Error::NotFound(id));
        }
        Ok(false)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    name: String,
    description: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            name: self.name,
            description: self.description,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
