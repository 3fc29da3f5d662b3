//! The work performed while a task is in progress.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::config::DispatchConfig;
use crate::error::Result;
use crate::model::{DurationClass, Task};

/// Work performed for a claimed task. An `Err` (or a panic) marks the task
/// as failed.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn perform(&self, task: &Task, class: DurationClass) -> Result<()>;
}

/// Stand-in for real work: occupies the task for a class-dependent interval.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    normal: Duration,
    long: Duration,
}

impl SimulatedWork {
    pub fn new(normal: Duration, long: Duration) -> Self {
        Self { normal, long }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.normal_duration, config.long_duration)
    }

    pub fn duration_for(&self, class: DurationClass) -> Duration {
        match class {
            DurationClass::Normal => self.normal,
            DurationClass::Long => self.long,
        }
    }
}

#[async_trait]
impl Workload for SimulatedWork {
    async fn perform(&self, task: &Task, class: DurationClass) -> Result<()> {
        let duration = self.duration_for(class);
        info!(name = %task.name, duration_ms = duration.as_millis() as u64, "task taken into work");
        tokio::time::sleep(duration).await;
        Ok(())
    }
}
