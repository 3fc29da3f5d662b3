//! Control plane: both dispatch pathways against one store.

mod common;

use std::time::Duration;

use common::{
    Behavior, FakeBroker, ScriptedWork, SessionEnd, Settlements, memory_store, pending_task,
    session, wait_for_terminal,
};
use taskq::config::DispatchConfig;
use taskq::dispatch::Disposition;
use taskq::engine::{ControlConfig, ControlPlane};
use taskq::model::Status;
use taskq::store::TaskStore;

fn config() -> ControlConfig {
    ControlConfig {
        dispatch: DispatchConfig {
            scan_interval: Duration::from_secs(30),
            normal_duration: Duration::from_secs(5),
            long_duration: Duration::from_secs(30),
            workers: 2,
        },
        reconnect_backoff: Duration::from_secs(10),
        poller: true,
    }
}

#[tokio::test(start_paused = true)]
async fn racing_pathways_execute_a_task_once() {
    let store = memory_store();
    let work = ScriptedWork::new(Behavior::Succeed, Duration::from_secs(5));
    let task = pending_task(&store, "t7").await;

    let settlements = Settlements::default();
    let body = format!(r#"{{"task_id": {}}}"#, task.id);
    let broker = FakeBroker::new(0, vec![session(&[&body], SessionEnd::Open, &settlements)]);

    let plane = ControlPlane::new(store.clone(), config()).with_workload(work.clone());
    let handle = tokio::spawn({
        let plane = plane.clone();
        async move { plane.run(Some(broker)).await }
    });

    let finished = wait_for_terminal(&store, task.id, Duration::from_secs(20)).await;
    assert_eq!(finished.status, Status::Done);
    assert_eq!(work.calls(), 1);

    // the consumer settles its delivery whether it won the claim or not
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*settlements.lock(), vec![(body, Disposition::Ack)]);

    plane.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn poller_alone_drains_pending_tasks() {
    let store = memory_store();
    let work = ScriptedWork::new(Behavior::Succeed, Duration::from_secs(5));
    let plane = ControlPlane::new(store.clone(), config()).with_workload(work.clone());
    let handle = tokio::spawn({
        let plane = plane.clone();
        async move { plane.run::<FakeBroker>(None).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    let a = pending_task(&store, "a").await;
    let b = pending_task(&store, "b").await;

    for id in [a.id, b.id] {
        let task = wait_for_terminal(&store, id, Duration::from_secs(40)).await;
        assert_eq!(task.status, Status::Done);
    }
    assert_eq!(work.calls(), 2);

    plane.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_lets_in_flight_work_finish() {
    let store = memory_store();
    let work = ScriptedWork::new(Behavior::Succeed, Duration::from_secs(20));
    let task = pending_task(&store, "slow").await;
    let plane = ControlPlane::new(store.clone(), config()).with_workload(work.clone());
    let handle = tokio::spawn({
        let plane = plane.clone();
        async move { plane.run::<FakeBroker>(None).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.get(task.id).await.unwrap().status, Status::InProgress);

    plane.shutdown();
    handle.await.unwrap();
    assert_eq!(store.get(task.id).await.unwrap().status, Status::Done);
}
