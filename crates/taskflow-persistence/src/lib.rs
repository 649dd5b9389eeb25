//! `InMemoryBackend`: a concrete `taskflow_core::Backend` over a
//! `dashmap`-backed store, so the merge-on-write protocol and concurrent
//! peer writers can be exercised without a real database.
//!
//! On-wire/on-disk encoding is the backend driver's own concern; this
//! crate is the minimal concrete driver `taskflow-core`'s
//! `Backend`/`Connection` traits are generic over.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use taskflow_core::{Backend, BackendError, Connection, FlowDetail, TaskDetail};

/// Shared, process-wide store a `Backend` round-trips records through.
///
/// One `SharedStore` may back several `Storage` instances at once; that is
/// exactly the peer-writer scenario the merge-on-write protocol is meant to
/// reconcile.
#[derive(Default)]
pub struct SharedStore {
    flows: DashMap<Uuid, FlowDetail>,
    tasks: DashMap<Uuid, TaskDetail>,
}

#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<SharedStore>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self { store: Arc::new(SharedStore::default()) }
    }

    pub fn shared(store: Arc<SharedStore>) -> Self {
        Self { store }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection is a per-call handle onto the shared store. The
/// read-merge-write sequence for a single record is atomic because it runs
/// entirely under the `dashmap::Entry` guard for that record's shard, so two
/// connections can never interleave a read and a write on the same record.
pub struct InMemoryConnection {
    store: Arc<SharedStore>,
}

impl Connection for InMemoryConnection {
    fn update_flow_details(&mut self, flow_detail: &FlowDetail) -> Result<FlowDetail, BackendError> {
        let mut entry = self.store.flows.entry(flow_detail.uuid).or_insert_with(|| flow_detail.clone());
        entry.update(flow_detail);
        Ok(entry.clone())
    }

    fn update_task_details(&mut self, task_detail: &TaskDetail) -> Result<TaskDetail, BackendError> {
        let mut entry = self.store.tasks.entry(task_detail.uuid).or_insert_with(|| task_detail.clone());
        entry.update(task_detail);
        Ok(entry.clone())
    }
}

impl Backend for InMemoryBackend {
    type Conn = InMemoryConnection;

    fn get_connection(&self) -> Result<Self::Conn, BackendError> {
        Ok(InMemoryConnection { store: self.store.clone() })
    }
}
