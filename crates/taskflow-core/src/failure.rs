//! Tagged wrapper distinguishing a captured exception from ordinary task
//! output, so `Storage` can store either under the same `results` slot.

use serde::{Deserialize, Serialize};

/// A captured failure, stored in place of a task's ordinary result.
///
/// Only the pieces `Storage` and its callers actually need are modeled:
/// a human-readable summary and an optional structured cause. The
/// execution engine that produces these is out of scope here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub exc_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    pub fn new(exc_info: impl Into<String>) -> Self {
        Self { exc_info: exc_info.into(), cause: None }
    }

    pub fn with_cause(exc_info: impl Into<String>, cause: Failure) -> Self {
        Self { exc_info: exc_info.into(), cause: Some(Box::new(cause)) }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.exc_info)
    }
}
