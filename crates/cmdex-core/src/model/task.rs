use serde::{Deserialize, Serialize};

/// Target entity of identity links
///
/// Only the fields the command core needs are modelled; `revision` is the
/// optimistic-concurrency counter checked by the session layer at flush time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub revision: u64,
}

impl Task {
    pub const ENTITY_TYPE: &'static str = "Task";

    /// Create a task at its first revision
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            revision: 1,
        }
    }
}
