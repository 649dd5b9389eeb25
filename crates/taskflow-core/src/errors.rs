//! Error taxonomy shared by the graph and storage modules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum FlowError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("dependency conflict: {0}")]
    Dependency(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<BackendError> for FlowError {
    fn from(err: BackendError) -> Self {
        FlowError::Backend(err.to_string())
    }
}

pub type FlowResult<T> = Result<T, FlowError>;
