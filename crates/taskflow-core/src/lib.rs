//! taskflow-core: graph-structured flow composition and result storage.
//!
//! Two pieces do the real work here:
//! - `graph`: composes tasks into a DAG by deriving edges from each task's
//!   declared `requires`/`provides` symbols (`GraphFlow`).
//! - `storage`: a name-addressable, persisted store of per-task state and
//!   results, with structured result indexing and parameter injection
//!   (`Storage`, `ThreadSafeStorage`).
//!
//! Everything else (`task_detail`, `flow_detail`, `result`, `failure`,
//! `backend`) is the data model and the pluggable persistence contract those
//! two pieces are built on. The execution engine that actually runs tasks
//! against a `GraphFlow`, and the backend driver that gives a `Backend` a
//! real database, both live outside this crate.

pub mod backend;
pub mod errors;
pub mod failure;
pub mod flow_detail;
pub mod graph;
pub mod result;
pub mod storage;
pub mod task_detail;
pub mod uuid_source;

pub use backend::{Backend, BackendError, Connection, NoBackend};
pub use errors::{FlowError, FlowResult};
pub use failure::Failure;
pub use flow_detail::{FlowDetail, FlowState};
pub use graph::{FlowItem, GraphFlow};
pub use result::{ResultIndex, TaskResult};
pub use storage::{Storage, ThreadSafeStorage};
pub use task_detail::{TaskDetail, TaskMeta, TaskState};
pub use uuid_source::{RandomUuidSource, UuidSource};

/// Reserved task name under which `Storage::inject` records injected
/// parameters.
pub const INJECTOR_NAME: &str = "_TaskFlow_INJECTOR";
