//! Exercises `GraphFlow` and `Storage` the way an execution engine would:
//! build a dependency graph, get a topological order from it, then drive
//! each task through `add_task -> set_result_mapping -> save -> fetch` in
//! that order.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use petgraph::algo::toposort;
use serde_json::json;
use uuid::Uuid;

use taskflow_core::backend::{Backend, BackendError, Connection};
use taskflow_core::{FlowDetail, FlowItem, GraphFlow, ResultIndex, Storage, TaskDetail, TaskState};

#[derive(Debug, Clone)]
struct Task {
    name: String,
    requires: HashSet<String>,
    provides: HashSet<String>,
}

impl Task {
    fn new(name: &str, requires: &[&str], provides: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            provides: provides.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FlowItem for Task {
    fn name(&self) -> &str {
        &self.name
    }
    fn requires(&self) -> &HashSet<String> {
        &self.requires
    }
    fn provides(&self) -> &HashSet<String> {
        &self.provides
    }
}

/// Minimal mock `Backend` recording every merge, so "every mutation is
/// offered to the backend" can be asserted directly rather than just
/// observed through `Storage`'s own state.
#[derive(Clone, Default)]
struct RecordingBackend {
    flow_writes: Arc<Mutex<Vec<FlowDetail>>>,
    task_writes: Arc<Mutex<Vec<TaskDetail>>>,
}

struct RecordingConnection(RecordingBackend);

impl Connection for RecordingConnection {
    fn update_flow_details(&mut self, flow_detail: &FlowDetail) -> Result<FlowDetail, BackendError> {
        self.0.flow_writes.lock().unwrap().push(flow_detail.clone());
        Ok(flow_detail.clone())
    }

    fn update_task_details(&mut self, task_detail: &TaskDetail) -> Result<TaskDetail, BackendError> {
        self.0.task_writes.lock().unwrap().push(task_detail.clone());
        Ok(task_detail.clone())
    }
}

impl Backend for RecordingBackend {
    type Conn = RecordingConnection;

    fn get_connection(&self) -> Result<Self::Conn, BackendError> {
        Ok(RecordingConnection(self.clone()))
    }
}

#[test]
fn engine_shaped_walk_through_graph_and_storage() {
    let fetch_a = Task::new("fetch_a", &[], &["a"]);
    let fetch_b = Task::new("fetch_b", &[], &["b"]);
    let combine = Task::new("combine", &["a", "b"], &["combined"]);

    let mut flow = GraphFlow::new();
    flow.add([combine.clone(), fetch_a.clone(), fetch_b.clone()]).unwrap();

    let order: Vec<Task> = toposort(flow.graph(), None).unwrap().into_iter().map(|idx| flow.graph()[idx].clone()).collect();

    assert_eq!(order.len(), 3);
    let combine_pos = order.iter().position(|t| t.name() == "combine").unwrap();
    let a_pos = order.iter().position(|t| t.name() == "fetch_a").unwrap();
    let b_pos = order.iter().position(|t| t.name() == "fetch_b").unwrap();
    assert!(a_pos < combine_pos);
    assert!(b_pos < combine_pos);

    let backend = RecordingBackend::default();
    let mut storage = Storage::new(FlowDetail::new(Uuid::new_v4()), Some(backend.clone()));
    let mut uuids: HashMap<String, Uuid> = HashMap::new();

    for task in &order {
        let uuid = Uuid::new_v4();
        storage.add_task(uuid, task.name()).unwrap();
        uuids.insert(task.name().to_string(), uuid);

        match task.name() {
            "fetch_a" => {
                let mut mapping = IndexMap::new();
                mapping.insert("a".to_string(), ResultIndex::Whole);
                storage.set_result_mapping(uuid, mapping);
                storage.save_success(uuid, json!(2)).unwrap();
            }
            "fetch_b" => {
                let mut mapping = IndexMap::new();
                mapping.insert("b".to_string(), ResultIndex::Whole);
                storage.set_result_mapping(uuid, mapping);
                storage.save_success(uuid, json!(3)).unwrap();
            }
            "combine" => {
                let a = storage.fetch("a").unwrap().as_i64().unwrap();
                let b = storage.fetch("b").unwrap().as_i64().unwrap();
                let mut mapping = IndexMap::new();
                mapping.insert("combined".to_string(), ResultIndex::Whole);
                storage.set_result_mapping(uuid, mapping);
                storage.save_success(uuid, json!(a + b)).unwrap();
            }
            other => panic!("unexpected task {other}"),
        }
    }

    assert_eq!(storage.fetch("combined").unwrap(), json!(5));
    assert_eq!(storage.get_task_state(uuids["combine"]).unwrap(), TaskState::Success);

    // Every add_task and every save offered its task detail to the backend.
    assert!(backend.task_writes.lock().unwrap().len() >= 6);
    assert!(backend.flow_writes.lock().unwrap().len() >= 3);
}

#[test]
fn duplicate_producer_across_add_calls_is_rejected() {
    let a = Task::new("a", &[], &["x"]);
    let c = Task::new("c", &[], &["x"]);

    let mut flow = GraphFlow::new();
    flow.add([a]).unwrap();
    let err = flow.add([c]).unwrap_err();
    assert!(matches!(err, taskflow_core::FlowError::Dependency(_)));
    assert_eq!(flow.len(), 1);
}

#[test]
fn fetch_mapped_args_feeds_a_combine_style_task() {
    let backend = RecordingBackend::default();
    let mut storage = Storage::new(FlowDetail::new(Uuid::new_v4()), Some(backend));

    let a_uuid = Uuid::new_v4();
    storage.add_task(a_uuid, "fetch_a").unwrap();
    let mut mapping = IndexMap::new();
    mapping.insert("a".to_string(), ResultIndex::Whole);
    storage.set_result_mapping(a_uuid, mapping);
    storage.save_success(a_uuid, json!(10)).unwrap();

    let mut args_mapping = IndexMap::new();
    args_mapping.insert("x".to_string(), "a".to_string());
    args_mapping.insert("y".to_string(), "missing".to_string());

    assert!(storage.fetch_mapped_args(&args_mapping).is_err());

    args_mapping.remove("y");
    let args = storage.fetch_mapped_args(&args_mapping).unwrap();
    assert_eq!(args.get("x"), Some(&json!(10)));
}
