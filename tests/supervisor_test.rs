//! Broker supervisor: unbounded reconnect with a fixed backoff.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FakeBroker, ScriptedWork, SessionEnd, Settlements, executor, memory_store, session};
use taskq::broker::Supervisor;
use taskq::dispatch::{Consumer, Disposition};
use taskq::shutdown::Shutdown;
use taskq::store::MemoryStore;
use taskq::worker::WorkerPool;

const BACKOFF: Duration = Duration::from_secs(10);

fn consumer(store: &Arc<MemoryStore>) -> (Arc<Consumer>, WorkerPool) {
    let exec = executor(store.clone(), ScriptedWork::succeeding());
    let (pool, queue) = WorkerPool::spawn(1, Arc::clone(&exec));
    (Arc::new(Consumer::new(exec, queue)), pool)
}

#[tokio::test(start_paused = true)]
async fn retries_until_the_broker_accepts() {
    let store = memory_store();
    let (consumer, _pool) = consumer(&store);
    let settlements = Settlements::default();
    let broker = FakeBroker::new(
        3,
        vec![session(&[r#"{"task_id": 1}"#], SessionEnd::Open, &settlements)],
    );
    let opens = Arc::clone(&broker.opens);
    let open_times = Arc::clone(&broker.open_times);
    let shutdown = Shutdown::new();

    let supervisor = Supervisor::new(broker, consumer, BACKOFF);
    let stop = shutdown.subscribe();
    let handle = tokio::spawn(async move { supervisor.run(stop).await });

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(opens.load(Ordering::SeqCst), 4);
    assert_eq!(
        *settlements.lock(),
        vec![(r#"{"task_id": 1}"#.to_string(), Disposition::Ack)]
    );

    let times = open_times.lock().clone();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= BACKOFF, "attempts closer than backoff");
    }

    // connected: no further attempts
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(opens.load(Ordering::SeqCst), 4);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_a_dropped_session() {
    let store = memory_store();
    let (consumer, _pool) = consumer(&store);
    let settlements = Settlements::default();
    let broker = FakeBroker::new(
        0,
        vec![
            session(&[r#"{"task_id": 1}"#], SessionEnd::Drop, &settlements),
            session(&[r#"{"task_id": 2}"#], SessionEnd::Open, &settlements),
        ],
    );
    let opens = Arc::clone(&broker.opens);
    let shutdown = Shutdown::new();

    let supervisor = Supervisor::new(broker, consumer, BACKOFF);
    let stop = shutdown.subscribe();
    let handle = tokio::spawn(async move { supervisor.run(stop).await });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(settlements.lock().len(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    let bodies: Vec<String> = settlements.lock().iter().map(|(b, _)| b.clone()).collect();
    assert_eq!(bodies, [r#"{"task_id": 1}"#, r#"{"task_id": 2}"#]);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_backoff() {
    let store = memory_store();
    let (consumer, _pool) = consumer(&store);
    let broker = FakeBroker::new(usize::MAX, Vec::new());
    let opens = Arc::clone(&broker.opens);
    let shutdown = Shutdown::new();

    let supervisor = Supervisor::new(broker, consumer, Duration::from_secs(3600));
    let stop = shutdown.subscribe();
    let handle = tokio::spawn(async move { supervisor.run(stop).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("supervisor did not stop during backoff")
        .unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}
