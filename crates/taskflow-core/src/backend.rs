//! The persistence contract `Storage` is generic over.
//!
//! A pluggable collaborator consumed as a generic parameter rather than
//! behind `Box<dyn _>`. That choice isn't cosmetic here — `Backend::Conn`
//! is an associated type, which makes `Backend` non-object-safe, so
//! `Storage<B: Backend>` is the only shape available short of
//! reintroducing dynamic dispatch through a second, hand-rolled vtable.

use thiserror::Error;

use crate::flow_detail::FlowDetail;
use crate::task_detail::TaskDetail;

#[derive(Debug, Error, Clone)]
#[error("backend error: {0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A scoped connection acquired for a single backend round-trip.
pub trait Connection {
    /// Merge `flow_detail` with whatever is stored and return the merged
    /// result.
    fn update_flow_details(&mut self, flow_detail: &FlowDetail) -> Result<FlowDetail, BackendError>;

    /// Merge `task_detail` with whatever is stored and return the merged
    /// result.
    fn update_task_details(&mut self, task_detail: &TaskDetail) -> Result<TaskDetail, BackendError>;
}

/// Factory for scoped `Connection`s.
pub trait Backend {
    type Conn: Connection;

    fn get_connection(&self) -> Result<Self::Conn, BackendError>;
}

/// Marker type satisfying `Backend` generic bounds when a `Storage` is
/// constructed with no backend at all (`Storage::new` with `backend: None`).
/// Never actually instantiated.
#[derive(Debug, Clone, Copy)]
pub struct NoBackend {
    _private: (),
}

pub struct NoConnection {
    _private: (),
}

impl Connection for NoConnection {
    fn update_flow_details(&mut self, flow_detail: &FlowDetail) -> Result<FlowDetail, BackendError> {
        Ok(flow_detail.clone())
    }

    fn update_task_details(&mut self, task_detail: &TaskDetail) -> Result<TaskDetail, BackendError> {
        Ok(task_detail.clone())
    }
}

impl Backend for NoBackend {
    type Conn = NoConnection;

    fn get_connection(&self) -> Result<Self::Conn, BackendError> {
        unreachable!("NoBackend is never instantiated; Storage skips backend calls when backend is None")
    }
}
