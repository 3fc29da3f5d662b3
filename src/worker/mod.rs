//! Task execution: the executor, the simulated workload, and the worker
//! pool that drains the asynchronous job queue.

pub mod executor;
pub mod pool;
pub mod workload;

pub use executor::{Execution, Executor};
pub use pool::{Job, JobQueue, WorkerPool};
pub use workload::{SimulatedWork, Workload};

/// Which dispatch pathway handed a task to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Poller,
    Consumer,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Poller => "poller",
            Source::Consumer => "consumer",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
