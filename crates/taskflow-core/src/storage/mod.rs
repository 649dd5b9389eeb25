//! `Storage`: the name-addressable, persisted store of per-task state and
//! results that mediates between an execution engine and a `Backend`.
//!
//! Every mutation that touches a `TaskDetail` or the owning `FlowDetail` is
//! immediately round-tripped through the backend via `persist_flow`/
//! `persist_task`, so the in-memory view never drifts from what a
//! concurrent peer writer has merged in.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::backend::{Backend, Connection, NoBackend};
use crate::errors::{FlowError, FlowResult};
use crate::flow_detail::FlowDetail;
use crate::result::{item_from_result, ResultIndex, TaskResult};
use crate::task_detail::{TaskDetail, TaskMeta, TaskState};
use crate::uuid_source::{RandomUuidSource, UuidSource};
use crate::INJECTOR_NAME;

/// A single `name -> index` entry recorded by `set_result_mapping`, kept in
/// the reverse mapping alongside the `uuid` it resolves against.
type ReverseEntry = (Uuid, ResultIndex);

/// Interface between an execution engine and a `Backend`.
///
/// Owns the in-memory `FlowDetail` plus the name-lookup layer
/// (`result_mappings` / `reverse_mapping`) built on top of it. `B = NoBackend`
/// is the persistence-less configuration (`Storage::new` with no backend).
pub struct Storage<B: Backend = NoBackend> {
    flow_detail: FlowDetail,
    backend: Option<B>,
    result_mappings: HashMap<Uuid, IndexMap<String, ResultIndex>>,
    reverse_mapping: IndexMap<String, Vec<ReverseEntry>>,
    uuid_source: Box<dyn UuidSource + Send + Sync>,
}

impl<B: Backend> Storage<B> {
    pub fn new(flow_detail: FlowDetail, backend: Option<B>) -> Self {
        Self {
            flow_detail,
            backend,
            result_mappings: HashMap::new(),
            reverse_mapping: IndexMap::new(),
            uuid_source: Box::new(RandomUuidSource),
        }
    }

    /// Overrides the UUID source used by `inject` (defaults to random v4).
    pub fn with_uuid_source(mut self, source: impl UuidSource + Send + Sync + 'static) -> Self {
        self.uuid_source = Box::new(source);
        self
    }

    pub fn flow_detail(&self) -> &FlowDetail {
        &self.flow_detail
    }

    /// Round-trips `self.flow_detail` through the backend and overlays the
    /// merged result, absorbing any changes a peer writer made in the
    /// meantime. A no-op when no backend is configured.
    fn persist_flow(&mut self) -> FlowResult<()> {
        let Some(backend) = &self.backend else { return Ok(()) };
        let mut conn = backend.get_connection()?;
        let merged = conn.update_flow_details(&self.flow_detail)?;
        self.flow_detail.update(&merged);
        tracing::trace!(flow_uuid = %self.flow_detail.uuid, "flow detail persisted");
        Ok(())
    }

    /// Same as `persist_flow` but for a single `TaskDetail`, identified by
    /// `uuid`. The merged result is written back into the flow detail's
    /// task list.
    fn persist_task(&mut self, uuid: Uuid) -> FlowResult<()> {
        let Some(backend) = &self.backend else { return Ok(()) };
        let snapshot = self.task_by_uuid(uuid)?.clone();
        let mut conn = backend.get_connection()?;
        let merged = conn.update_task_details(&snapshot)?;
        self.task_by_uuid_mut(uuid)?.update(&merged);
        tracing::trace!(task_uuid = %uuid, "task detail persisted");
        Ok(())
    }

    fn task_by_uuid(&self, uuid: Uuid) -> FlowResult<&TaskDetail> {
        self.flow_detail.by_uuid(uuid).ok_or_else(|| FlowError::NotFound(format!("unknown task: {uuid}")))
    }

    fn task_by_uuid_mut(&mut self, uuid: Uuid) -> FlowResult<&mut TaskDetail> {
        self.flow_detail.by_uuid_mut(uuid).ok_or_else(|| FlowError::NotFound(format!("unknown task: {uuid}")))
    }

    /// Registers `task_name`/`uuid` as a `PENDING` task and persists it.
    ///
    /// A duplicate `uuid` or `name` is rejected outright rather than
    /// silently overwritten. The reserved injector name is exempt from the
    /// name check: every `inject` call registers a fresh synthetic task
    /// under the same constant name, by design.
    pub fn add_task(&mut self, uuid: Uuid, task_name: &str) -> FlowResult<()> {
        if self.flow_detail.contains_uuid(uuid) {
            return Err(FlowError::Duplicate(format!("task uuid already exists: {uuid}")));
        }
        if task_name != INJECTOR_NAME && self.flow_detail.contains_name(task_name) {
            return Err(FlowError::Duplicate(format!("task name already exists: {task_name}")));
        }

        let td = TaskDetail::new(uuid, task_name);
        self.flow_detail.add(td);
        self.persist_flow()?;
        self.persist_task(uuid)?;
        Ok(())
    }

    pub fn get_uuid_by_name(&self, task_name: &str) -> FlowResult<Uuid> {
        self.flow_detail
            .by_name(task_name)
            .map(|t| t.uuid)
            .ok_or_else(|| FlowError::NotFound(format!("unknown task name: {task_name}")))
    }

    pub fn set_task_state(&mut self, uuid: Uuid, state: TaskState) -> FlowResult<()> {
        self.task_by_uuid_mut(uuid)?.state = state;
        self.persist_task(uuid)
    }

    pub fn get_task_state(&self, uuid: Uuid) -> FlowResult<TaskState> {
        Ok(self.task_by_uuid(uuid)?.state)
    }

    /// Writes `meta.progress` (and `meta.progress_details` if `details` is
    /// non-empty, else drops any previous details), persisting the result.
    pub fn set_task_progress(&mut self, uuid: Uuid, progress: f64, details: Map<String, Value>) -> FlowResult<()> {
        let td = self.task_by_uuid_mut(uuid)?;
        let meta = td.meta.get_or_insert_with(TaskMeta::default);
        meta.progress = progress;
        if details.is_empty() {
            meta.progress_details = None;
        } else {
            meta.progress_details = Some(Value::Object(details));
        }
        self.persist_task(uuid)
    }

    pub fn get_task_progress(&self, uuid: Uuid) -> FlowResult<f64> {
        Ok(self.task_by_uuid(uuid)?.meta.as_ref().map(|m| m.progress).unwrap_or(0.0))
    }

    pub fn get_task_progress_details(&self, uuid: Uuid) -> FlowResult<Option<Value>> {
        Ok(self.task_by_uuid(uuid)?.meta.as_ref().and_then(|m| m.progress_details.clone()))
    }

    /// Warn (never fail) if `data` does not satisfy every entry in this
    /// task's result mapping. Skipped for `Failure` payloads: a mapping
    /// describes a successful result's shape, not a failure's.
    fn check_all_results_provided(&self, uuid: Uuid, task_name: &str, data: &TaskResult) {
        if data.is_failure() {
            return;
        }
        let Some(mapping) = self.result_mappings.get(&uuid) else { return };
        for (name, index) in mapping {
            if item_from_result(data, index, name).is_none() {
                tracing::warn!(task = task_name, name, index = ?index, "task did not supply result with this index");
            }
        }
    }

    /// Stores `data` in `results`, sets `state` (defaulting to `SUCCESS` is
    /// the caller's job via `save_success`), and persists. Warns on
    /// incomplete result coverage; never fails for that reason.
    pub fn save(&mut self, uuid: Uuid, data: TaskResult, state: TaskState) -> FlowResult<()> {
        let name = self.task_by_uuid(uuid)?.name.clone();
        {
            let td = self.task_by_uuid_mut(uuid)?;
            td.state = state;
            td.results = Some(data.clone());
        }
        self.persist_task(uuid)?;
        self.check_all_results_provided(uuid, &name, &data);
        Ok(())
    }

    /// Convenience over `save` defaulting `state` to `SUCCESS`.
    pub fn save_success(&mut self, uuid: Uuid, data: Value) -> FlowResult<()> {
        self.save(uuid, TaskResult::Ok(data), TaskState::Success)
    }

    /// Returns `results` iff the task's current state carries a result.
    pub fn get(&self, uuid: Uuid) -> FlowResult<&TaskResult> {
        let td = self.task_by_uuid(uuid)?;
        if !td.state.has_results() {
            return Err(FlowError::NotFound(format!("result for task {uuid} is not known")));
        }
        td.results.as_ref().ok_or_else(|| FlowError::NotFound(format!("result for task {uuid} is not known")))
    }

    /// Clears `results` and resets `state` (defaulting to `PENDING`).
    pub fn reset(&mut self, uuid: Uuid, state: TaskState) -> FlowResult<()> {
        {
            let td = self.task_by_uuid_mut(uuid)?;
            td.results = None;
            td.state = state;
        }
        self.persist_task(uuid)
    }

    /// Records external parameters as the result of a synthetic
    /// `_TaskFlow_INJECTOR` task. Each key in `pairs` becomes resolvable by
    /// `fetch`; successive `inject` calls stack, with the earliest
    /// registration winning ties in `fetch`.
    pub fn inject(&mut self, pairs: Map<String, Value>) -> FlowResult<Uuid> {
        let injector_uuid = self.uuid_source.next_uuid();
        self.add_task(injector_uuid, INJECTOR_NAME)?;
        self.save_success(injector_uuid, Value::Object(pairs.clone()))?;
        for key in pairs.keys() {
            self.reverse_mapping.entry(key.clone()).or_default().push((injector_uuid, ResultIndex::Key(key.clone())));
        }
        Ok(injector_uuid)
    }

    /// Registers `name -> index` entries for `uuid`'s result and appends
    /// each to the reverse mapping. A no-op for an empty mapping.
    pub fn set_result_mapping(&mut self, uuid: Uuid, mapping: IndexMap<String, ResultIndex>) {
        if mapping.is_empty() {
            return;
        }
        for (name, index) in &mapping {
            self.reverse_mapping.entry(name.clone()).or_default().push((uuid, index.clone()));
        }
        self.result_mappings.insert(uuid, mapping);
    }

    /// Resolves `name` against the reverse mapping, walking registrations
    /// in insertion order and returning the first one whose task is in a
    /// results-bearing state and whose index resolves.
    pub fn fetch(&self, name: &str) -> FlowResult<Value> {
        let entries = self.reverse_mapping.get(name).ok_or_else(|| FlowError::NotFound(format!("name {name} is not mapped")))?;
        for (uuid, index) in entries {
            if let Ok(result) = self.get(*uuid) {
                if let Some(value) = item_from_result(result, index, name) {
                    return Ok(value);
                }
            }
        }
        Err(FlowError::NotFound(format!("unable to find result {name}")))
    }

    /// Every name that currently resolves. Debugging/testing aid, not part
    /// of normal execution.
    pub fn fetch_all(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        for name in self.reverse_mapping.keys() {
            if let Ok(value) = self.fetch(name) {
                out.insert(name.clone(), value);
            }
        }
        out
    }

    /// `argname -> fetch(resultname)` for every entry in `mapping`. Fails
    /// as a whole if any individual fetch fails.
    pub fn fetch_mapped_args(&self, mapping: &IndexMap<String, String>) -> FlowResult<IndexMap<String, Value>> {
        let mut out = IndexMap::with_capacity(mapping.len());
        for (argname, resultname) in mapping {
            out.insert(argname.clone(), self.fetch(resultname)?);
        }
        Ok(out)
    }

    pub fn set_flow_state(&mut self, state: crate::flow_detail::FlowState) -> FlowResult<()> {
        self.flow_detail.state = state;
        self.persist_flow()
    }

    pub fn get_flow_state(&self) -> crate::flow_detail::FlowState {
        self.flow_detail.state
    }
}

/// A `Storage` whose every public operation is serialized by a single lock
/// covering the whole call, backend round-trip included.
///
/// A wrapper struct forwarding each method under a `parking_lot::Mutex`
/// rather than locking per-field. Reentrancy is not required: no public
/// `Storage` method calls another public method on the same instance.
pub struct ThreadSafeStorage<B: Backend = NoBackend> {
    inner: Arc<Mutex<Storage<B>>>,
}

impl<B: Backend> Clone for ThreadSafeStorage<B> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<B: Backend> ThreadSafeStorage<B> {
    pub fn new(flow_detail: FlowDetail, backend: Option<B>) -> Self {
        Self { inner: Arc::new(Mutex::new(Storage::new(flow_detail, backend))) }
    }

    pub fn from_storage(storage: Storage<B>) -> Self {
        Self { inner: Arc::new(Mutex::new(storage)) }
    }

    pub fn flow_detail(&self) -> FlowDetail {
        self.inner.lock().flow_detail().clone()
    }

    pub fn add_task(&self, uuid: Uuid, task_name: &str) -> FlowResult<()> {
        self.inner.lock().add_task(uuid, task_name)
    }

    pub fn get_uuid_by_name(&self, task_name: &str) -> FlowResult<Uuid> {
        self.inner.lock().get_uuid_by_name(task_name)
    }

    pub fn set_task_state(&self, uuid: Uuid, state: TaskState) -> FlowResult<()> {
        self.inner.lock().set_task_state(uuid, state)
    }

    pub fn get_task_state(&self, uuid: Uuid) -> FlowResult<TaskState> {
        self.inner.lock().get_task_state(uuid)
    }

    pub fn set_task_progress(&self, uuid: Uuid, progress: f64, details: Map<String, Value>) -> FlowResult<()> {
        self.inner.lock().set_task_progress(uuid, progress, details)
    }

    pub fn get_task_progress(&self, uuid: Uuid) -> FlowResult<f64> {
        self.inner.lock().get_task_progress(uuid)
    }

    pub fn get_task_progress_details(&self, uuid: Uuid) -> FlowResult<Option<Value>> {
        self.inner.lock().get_task_progress_details(uuid)
    }

    pub fn save(&self, uuid: Uuid, data: TaskResult, state: TaskState) -> FlowResult<()> {
        self.inner.lock().save(uuid, data, state)
    }

    pub fn save_success(&self, uuid: Uuid, data: Value) -> FlowResult<()> {
        self.inner.lock().save_success(uuid, data)
    }

    pub fn get(&self, uuid: Uuid) -> FlowResult<TaskResult> {
        self.inner.lock().get(uuid).cloned()
    }

    pub fn reset(&self, uuid: Uuid, state: TaskState) -> FlowResult<()> {
        self.inner.lock().reset(uuid, state)
    }

    pub fn inject(&self, pairs: Map<String, Value>) -> FlowResult<Uuid> {
        self.inner.lock().inject(pairs)
    }

    pub fn set_result_mapping(&self, uuid: Uuid, mapping: IndexMap<String, ResultIndex>) {
        self.inner.lock().set_result_mapping(uuid, mapping)
    }

    pub fn fetch(&self, name: &str) -> FlowResult<Value> {
        self.inner.lock().fetch(name)
    }

    pub fn fetch_all(&self) -> IndexMap<String, Value> {
        self.inner.lock().fetch_all()
    }

    pub fn fetch_mapped_args(&self, mapping: &IndexMap<String, String>) -> FlowResult<IndexMap<String, Value>> {
        self.inner.lock().fetch_mapped_args(mapping)
    }

    pub fn set_flow_state(&self, state: crate::flow_detail::FlowState) -> FlowResult<()> {
        self.inner.lock().set_flow_state(state)
    }

    pub fn get_flow_state(&self) -> crate::flow_detail::FlowState {
        self.inner.lock().get_flow_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoBackend;
    use serde_json::json;

    fn new_storage() -> Storage<NoBackend> {
        Storage::new(FlowDetail::new(Uuid::new_v4()), None)
    }

    #[test]
    fn result_indexing_scenario() {
        let mut storage = new_storage();
        let u1 = Uuid::new_v4();
        storage.add_task(u1, "t").unwrap();

        let mut mapping = IndexMap::new();
        mapping.insert("first".to_string(), ResultIndex::Position(0));
        mapping.insert("second".to_string(), ResultIndex::Position(1));
        storage.set_result_mapping(u1, mapping);

        storage.save_success(u1, json!([10, 20])).unwrap();

        assert_eq!(storage.fetch("first").unwrap(), json!(10));
        assert_eq!(storage.fetch("second").unwrap(), json!(20));
        assert!(matches!(storage.fetch("third"), Err(FlowError::NotFound(_))));
    }

    #[test]
    fn injection_and_shadowing() {
        let mut storage = new_storage();
        let mut first = Map::new();
        first.insert("x".to_string(), json!(1));
        let first_uuid = storage.inject(first).unwrap();

        let mut second = Map::new();
        second.insert("x".to_string(), json!(2));
        storage.inject(second).unwrap();

        assert_eq!(storage.fetch("x").unwrap(), json!(1));

        storage.reset(first_uuid, TaskState::Pending).unwrap();
        assert_eq!(storage.fetch("x").unwrap(), json!(2));
    }

    #[test]
    fn incomplete_result_is_not_found_but_not_fatal() {
        let mut storage = new_storage();
        let u = Uuid::new_v4();
        storage.add_task(u, "t").unwrap();

        let mut mapping = IndexMap::new();
        mapping.insert("a".to_string(), ResultIndex::Position(0));
        mapping.insert("b".to_string(), ResultIndex::Position(5));
        storage.set_result_mapping(u, mapping);

        storage.save_success(u, json!([42])).unwrap();
        assert_eq!(storage.fetch("a").unwrap(), json!(42));
        assert!(matches!(storage.fetch("b"), Err(FlowError::NotFound(_))));
    }

    #[test]
    fn get_requires_results_bearing_state() {
        let mut storage = new_storage();
        let u = Uuid::new_v4();
        storage.add_task(u, "t").unwrap();
        assert!(matches!(storage.get(u), Err(FlowError::NotFound(_))));
        storage.set_task_state(u, TaskState::Running).unwrap();
        assert!(matches!(storage.get(u), Err(FlowError::NotFound(_))));
        storage.save_success(u, json!(1)).unwrap();
        assert!(storage.get(u).is_ok());
    }

    #[test]
    fn add_task_rejects_duplicate_uuid_and_name() {
        let mut storage = new_storage();
        let u = Uuid::new_v4();
        storage.add_task(u, "t").unwrap();
        assert!(matches!(storage.add_task(u, "other"), Err(FlowError::Duplicate(_))));
        assert!(matches!(storage.add_task(Uuid::new_v4(), "t"), Err(FlowError::Duplicate(_))));
    }

    #[test]
    fn fetch_mapped_args_fails_as_whole_on_miss() {
        let mut storage = new_storage();
        let u = Uuid::new_v4();
        storage.add_task(u, "t").unwrap();
        let mut mapping = IndexMap::new();
        mapping.insert("a".to_string(), ResultIndex::Whole);
        storage.set_result_mapping(u, mapping);
        storage.save_success(u, json!(7)).unwrap();

        let mut args = IndexMap::new();
        args.insert("x".to_string(), "a".to_string());
        assert_eq!(storage.fetch_mapped_args(&args).unwrap().get("x"), Some(&json!(7)));

        args.insert("y".to_string(), "missing".to_string());
        assert!(storage.fetch_mapped_args(&args).is_err());
    }

    #[test]
    fn progress_tracks_meta() {
        let mut storage = new_storage();
        let u = Uuid::new_v4();
        storage.add_task(u, "t").unwrap();
        assert_eq!(storage.get_task_progress(u).unwrap(), 0.0);

        let mut details = Map::new();
        details.insert("phase".to_string(), json!("scan"));
        storage.set_task_progress(u, 0.5, details).unwrap();
        assert_eq!(storage.get_task_progress(u).unwrap(), 0.5);
        assert_eq!(storage.get_task_progress_details(u).unwrap(), Some(json!({"phase": "scan"})));

        storage.set_task_progress(u, 1.0, Map::new()).unwrap();
        assert_eq!(storage.get_task_progress_details(u).unwrap(), None);
    }

    #[test]
    fn thread_safe_wrapper_roundtrip() {
        let storage = ThreadSafeStorage::new(FlowDetail::new(Uuid::new_v4()), None::<NoBackend>);
        let u = Uuid::new_v4();
        storage.add_task(u, "t").unwrap();
        storage.save_success(u, json!(42)).unwrap();
        assert_eq!(storage.get(u).unwrap(), TaskResult::Ok(json!(42)));
    }
}
