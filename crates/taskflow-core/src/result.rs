//! `TaskResult` models the value a task saves (`Storage::save`): either an
//! ordinary JSON payload or a captured `Failure`. `ResultIndex` and `lookup`
//! implement the subscript-or-fail discipline `Storage::fetch` relies on to
//! treat mapping-like and sequence-like results uniformly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::failure::Failure;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum TaskResult {
    Ok(Value),
    Err(Failure),
}

impl TaskResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskResult::Err(_))
    }
}

/// How a single name is mapped into a task's result.
///
/// `Whole` names the entire result; `Position`/`Key` subscript into a
/// sequence or mapping result respectively. `#[serde(untagged)]` so a
/// result mapping round-trips through the same plain JSON encoding as
/// everything else in a `TaskDetail` (an index is just `null`, a number, or
/// a string on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultIndex {
    Whole,
    Position(usize),
    Key(String),
}

/// Subscript `result` by `index`, naming the failure after `name` on miss.
///
/// A `Failure` payload has no subscriptable shape, so any index other
/// than `Whole` fails against it.
pub fn item_from_result(result: &TaskResult, index: &ResultIndex, name: &str) -> Option<Value> {
    match (result, index) {
        // index=null names the whole result, failure or not.
        (TaskResult::Ok(v), ResultIndex::Whole) => Some(v.clone()),
        (TaskResult::Err(f), ResultIndex::Whole) => serde_json::to_value(f).ok(),
        (TaskResult::Ok(Value::Array(items)), ResultIndex::Position(i)) => items.get(*i).cloned(),
        (TaskResult::Ok(Value::Object(map)), ResultIndex::Key(k)) => map.get(k).cloned(),
        (TaskResult::Ok(Value::Object(map)), ResultIndex::Position(i)) => map.get(&i.to_string()).cloned(),
        _ => {
            let _ = name;
            None
        }
    }
}
