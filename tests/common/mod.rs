//! Shared fixtures: a scriptable workload and an in-process broker.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;

use taskq::broker::{Acknowledge, Broker};
use taskq::dispatch::Disposition;
use taskq::error::{Error, Result};
use taskq::model::{DurationClass, NewTask, Status, Task, TaskId};
use taskq::store::{MemoryStore, TaskStore};
use taskq::worker::{Executor, Workload};

// ---------------------------------------------------------------------------
// Workload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Sleeps for `delay`, then behaves as configured. Counts every call.
pub struct ScriptedWork {
    pub behavior: Behavior,
    pub delay: Duration,
    calls: AtomicUsize,
    classes: Mutex<Vec<(TaskId, DurationClass)>>,
}

impl ScriptedWork {
    pub fn new(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            classes: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Behavior::Succeed, Duration::from_millis(50))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn classes(&self) -> Vec<(TaskId, DurationClass)> {
        self.classes.lock().clone()
    }
}

#[async_trait]
impl Workload for ScriptedWork {
    async fn perform(&self, task: &Task, class: DurationClass) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.classes.lock().push((task.id, class));
        tokio::time::sleep(self.delay).await;
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(Error::Execution(format!("work on {} blew up", task.name))),
            Behavior::Panic => panic!("work on {} panicked", task.name),
        }
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn executor(store: Arc<MemoryStore>, work: Arc<ScriptedWork>) -> Arc<Executor> {
    Arc::new(Executor::new(store, work))
}

pub async fn pending_task(store: &MemoryStore, name: &str) -> Task {
    store
        .create(NewTask::new(name, format!("{name} description")))
        .await
        .unwrap()
}

/// Poll the store until `id` is terminal or the (virtual) deadline passes.
pub async fn wait_for_terminal(store: &MemoryStore, id: TaskId, within: Duration) -> Task {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let task = store.get(id).await.unwrap();
        if task.status.is_terminal() || tokio::time::Instant::now() >= deadline {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Store faults
// ---------------------------------------------------------------------------

/// Memory store that can fail status writes or panic on reads.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing_writes: Mutex<HashMap<Status, usize>>,
    panic_on_get: Mutex<Option<TaskId>>,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `times` writes that move a task to `status`.
    pub fn fail_writes_to(&self, status: Status, times: usize) {
        self.failing_writes.lock().insert(status, times);
    }

    /// Panic whenever `id` is read.
    pub fn panic_on_get(&self, id: TaskId) {
        *self.panic_on_get.lock() = Some(id);
    }
}

#[async_trait]
impl TaskStore for FaultyStore {
    async fn create(&self, new: NewTask) -> Result<Task> {
        self.inner.create(new).await
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        if *self.panic_on_get.lock() == Some(id) {
            panic!("store read of task {id} panicked");
        }
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Task>> {
        self.inner.list().await
    }

    async fn list_by_status(&self, status: Status) -> Result<Vec<Task>> {
        self.inner.list_by_status(status).await
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn compare_and_set(&self, id: TaskId, expected: Status, next: Status) -> Result<bool> {
        {
            let mut failing = self.failing_writes.lock();
            if let Some(remaining) = failing.get_mut(&next).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(Error::Other("store hiccup".to_string()));
            }
        }
        self.inner.compare_and_set(id, expected, next).await
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

pub type Settlements = Arc<Mutex<Vec<(String, Disposition)>>>;

/// A delivery that records how it was settled.
pub struct FakeDelivery {
    body: Vec<u8>,
    settlements: Settlements,
}

#[async_trait]
impl Acknowledge for FakeDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(self) -> Result<()> {
        let body = String::from_utf8_lossy(&self.body).into_owned();
        self.settlements.lock().push((body, Disposition::Ack));
        Ok(())
    }

    async fn reject(self) -> Result<()> {
        let body = String::from_utf8_lossy(&self.body).into_owned();
        self.settlements.lock().push((body, Disposition::Reject));
        Ok(())
    }
}

pub type FakeSession = BoxStream<'static, Result<FakeDelivery>>;

/// How a scripted session ends after its deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stays open until the consumer stops reading.
    Open,
    /// Yields a connection error.
    Drop,
}

pub fn session(bodies: &[&str], end: SessionEnd, settlements: &Settlements) -> FakeSession {
    let deliveries: Vec<Result<FakeDelivery>> = bodies
        .iter()
        .map(|body| {
            Ok(FakeDelivery {
                body: body.as_bytes().to_vec(),
                settlements: Arc::clone(settlements),
            })
        })
        .collect();
    let head = stream::iter(deliveries);
    match end {
        SessionEnd::Open => head.chain(stream::pending()).boxed(),
        SessionEnd::Drop => head
            .chain(stream::once(async {
                Err(Error::Connection("connection reset by peer".to_string()))
            }))
            .boxed(),
    }
}

/// Broker whose `open` fails a number of times, then hands out scripted
/// sessions in order. Once the script is exhausted every open fails.
pub struct FakeBroker {
    pub opens: Arc<AtomicUsize>,
    pub open_times: Arc<Mutex<Vec<tokio::time::Instant>>>,
    failures_before_connect: AtomicUsize,
    sessions: Mutex<VecDeque<FakeSession>>,
}

impl FakeBroker {
    pub fn new(failures_before_connect: usize, sessions: Vec<FakeSession>) -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            open_times: Arc::new(Mutex::new(Vec::new())),
            failures_before_connect: AtomicUsize::new(failures_before_connect),
            sessions: Mutex::new(sessions.into()),
        }
    }
}

#[async_trait]
impl Broker for FakeBroker {
    type Delivery = FakeDelivery;
    type Session = FakeSession;

    async fn open(&self) -> Result<FakeSession> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open_times.lock().push(tokio::time::Instant::now());

        let remaining = self.failures_before_connect.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_before_connect.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Connection("connection refused".to_string()));
        }
        self.sessions
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Connection("connection refused".to_string()))
    }
}
