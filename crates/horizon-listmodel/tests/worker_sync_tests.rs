//! Tests for editing a model from a worker thread and syncing it back.

mod common;

use std::sync::Arc;

use common::record_signals;
use horizon_listmodel::{Error, EventLoop, ListModel, RowProxy, UidGenerator, Value, WorkerAgent};
use horizon_listmodel_core::{CoreError, EventLoopHandle, WorkerBuilder};
use serde_json::json;

/// Quits the owner loop even if the worker task panics.
struct QuitOnDrop(EventLoopHandle);

impl Drop for QuitOnDrop {
    fn drop(&mut self) {
        self.0.quit();
    }
}

/// Runs `task` with `agent` on a worker thread while the owner loop spins.
fn run_on_worker<F>(event_loop: &EventLoop, agent: Arc<WorkerAgent>, task: F)
where
    F: FnOnce(&Arc<WorkerAgent>) + Send + 'static,
{
    let quit = QuitOnDrop(event_loop.handle());
    let worker = WorkerBuilder::new().name("list-worker").build().unwrap();
    agent
        .run_on(&worker, move |agent| {
            let _quit = quit;
            task(agent);
        })
        .unwrap();
    event_loop.exec();
    assert!(worker.stop_and_join());
}

fn owner_model(rows: serde_json::Value) -> Arc<ListModel> {
    let model = ListModel::with_uids(UidGenerator::new());
    model.append(rows);
    model
}

#[test]
fn test_worker_edits_reach_owner_on_sync() {
    let event_loop = EventLoop::new();
    let model = owner_model(json!({"x": 1}));
    let log = record_signals(&model);
    let agent = model.agent().unwrap();

    run_on_worker(&event_loop, agent, |agent| {
        agent.append(json!({"x": 2}));
        agent.set_property(0, "x", 10);
        assert_eq!(agent.pending_changes(), 2);
        agent.sync();
        assert_eq!(agent.pending_changes(), 0);
    });

    assert_eq!(model.to_value().to_json(), json!([{"x": 10.0}, {"x": 2.0}]));
    assert_eq!(*log.lock(), vec!["inserted 1-1", "changed 0-0 [0]", "count"]);
}

#[test]
fn test_nothing_reaches_owner_before_sync() {
    let event_loop = EventLoop::new();
    let model = owner_model(json!([{"x": 1}, {"x": 2}]));
    let log = record_signals(&model);
    let agent = model.agent().unwrap();

    run_on_worker(&event_loop, agent.clone(), |agent| {
        agent.remove(0, 1);
        agent.move_rows(0, 0, 1);
    });
    assert_eq!(model.count(), 2);
    assert!(log.lock().is_empty());
    assert_eq!(agent.count(), 1);

    run_on_worker(&event_loop, agent, |agent| agent.sync());
    assert_eq!(model.to_value().to_json(), json!([{"x": 2.0}]));
    assert_eq!(*log.lock(), vec!["removed 0-0", "count"]);
}

#[test]
fn test_proxies_survive_sync() {
    let event_loop = EventLoop::new();
    let model = owner_model(json!([{"name": "a"}, {"name": "b"}, {"name": "c"}]));
    let first = model.get(0).unwrap();
    let last = model.get(2).unwrap();
    let middle = model.get(1).unwrap();
    let agent = model.agent().unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let s = seen.clone();
    last.property_changed()
        .connect(move |(name, value)| s.lock().push(format!("{name}={value}")));

    run_on_worker(&event_loop, agent, |agent| {
        agent.move_rows(2, 0, 1);
        agent.set_property(0, "name", "C");
        agent.remove(2, 1);
        agent.sync();
    });

    assert!(model.get(0).unwrap().ptr_eq(&last));
    assert!(model.get(1).unwrap().ptr_eq(&first));
    assert_eq!(last.row(), Some(0));
    assert_eq!(last.get("name"), Value::from("C"));
    assert_eq!(middle.row(), None);
    assert_eq!(*seen.lock(), vec!["name=C"]);
}

#[test]
fn test_nested_changes_replay_on_nested_facade() {
    let event_loop = EventLoop::new();
    let model = owner_model(json!({"name": "a", "items": [{"v": 1}]}));
    let nested = model.data(0, 1).as_model().cloned().unwrap();
    let nested_log = record_signals(&nested);
    let agent = model.agent().unwrap();

    run_on_worker(&event_loop, agent, |agent| {
        let items = agent.model().data(0, 1);
        let items = items.as_model().unwrap();
        items.append(json!({"v": 2}));
        agent.sync();
    });

    assert_eq!(nested.count(), 2);
    assert!(Arc::ptr_eq(&model.data(0, 1).as_model().cloned().unwrap(), &nested));
    assert_eq!(*nested_log.lock(), vec!["inserted 1-1"]);
}

#[test]
fn test_dynamic_model_sync() {
    let event_loop = EventLoop::new();
    let model = ListModel::with_uids(UidGenerator::new());
    model.set_dynamic_roles(true);
    model.append(json!({"v": 1}));
    let row = model.get(0).unwrap();
    let agent = model.agent().unwrap();

    run_on_worker(&event_loop, agent, |agent| {
        agent.set_property(0, "v", "one");
        agent.append(json!({"v": [{"w": true}]}));
        agent.sync();
    });

    assert!(model.get(0).unwrap().ptr_eq(&row));
    assert_eq!(row.get("v"), Value::from("one"));
    assert_eq!(
        model.to_value().to_json(),
        json!([{"v": "one"}, {"v": [{"w": true}]}])
    );
}

#[test]
fn test_repeated_sync_is_idempotent() {
    let event_loop = EventLoop::new();
    let model = owner_model(json!([{"x": 1}, {"x": 2}]));
    let agent = model.agent().unwrap();

    run_on_worker(&event_loop, agent.clone(), |agent| {
        agent.set(1, json!({"x": 3}));
        agent.sync();
    });
    let uids: Vec<_> = (0..2).map(|row| model.get(row).unwrap().uid()).collect();
    let snapshot = model.to_value().to_json();
    let log = record_signals(&model);

    run_on_worker(&event_loop, agent, |agent| agent.sync());
    assert_eq!(model.to_value().to_json(), snapshot);
    assert_eq!((0..2).map(|row| model.get(row).unwrap().uid()).collect::<Vec<_>>(), uids);
    assert!(log.lock().is_empty());
}

#[test]
fn test_sync_after_owner_dropped_unblocks_worker() {
    let event_loop = EventLoop::new();
    let model = owner_model(json!({"x": 1}));
    let agent = model.agent().unwrap();
    drop(model);

    run_on_worker(&event_loop, agent, |agent| {
        agent.append(json!({"x": 2}));
        assert_eq!(agent.try_sync(), Ok(false));
        assert!(agent.is_orphaned());
    });
}

#[test]
fn test_run_on_stopped_worker_is_an_error() {
    let _event_loop = EventLoop::new();
    let model = owner_model(json!({"x": 1}));
    let agent = model.agent().unwrap();
    let worker = WorkerBuilder::new().build().unwrap();
    assert!(worker.stop_and_join());

    let err = agent.run_on(&worker, |agent| agent.clear()).unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::WorkerStopped { .. })), "{err}");
    assert_eq!(agent.count(), 1);
}

#[test]
fn test_sync_fails_when_owner_loop_is_gone() {
    let agent = {
        let _event_loop = EventLoop::new();
        let model = owner_model(json!({"x": 1}));
        model.agent().unwrap()
    };
    let worker = std::thread::spawn(move || agent.try_sync().is_err());
    assert!(worker.join().unwrap());
}
