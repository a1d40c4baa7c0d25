//! Audit trail records
//!
//! Commands describe what they changed with an [`AuditEntry`]; the command
//! context stamps it (id, timestamp, actor) into an immutable [`AuditRecord`]
//! and queues it next to the mutation it describes, so both reach the audit
//! sink in the same unit of work or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    SetOwner,
    Assign,
    AddUserLink,
    DeleteUserLink,
    AddGroupLink,
    DeleteGroupLink,
    Update,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::SetOwner => "SetOwner",
            OperationType::Assign => "Assign",
            OperationType::AddUserLink => "AddUserLink",
            OperationType::DeleteUserLink => "DeleteUserLink",
            OperationType::AddGroupLink => "AddGroupLink",
            OperationType::DeleteGroupLink => "DeleteGroupLink",
            OperationType::Update => "Update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            OperationType::SetOwner,
            OperationType::Assign,
            OperationType::AddUserLink,
            OperationType::DeleteUserLink,
            OperationType::AddGroupLink,
            OperationType::DeleteGroupLink,
            OperationType::Update,
        ]
        .into_iter()
        .find(|op| op.as_str() == s)
    }
}

/// Unstamped description of one property change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub operation_type: OperationType,
    pub entity_type: String,
    pub entity_id: String,
    pub property: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl AuditEntry {
    pub(crate) fn stamp(self, actor_id: Option<String>) -> AuditRecord {
        AuditRecord {
            id: Uuid::now_v7().to_string(),
            operation_type: self.operation_type,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            timestamp: Utc::now(),
            actor_id,
            property: self.property,
            old_value: self.old_value,
            new_value: self.new_value,
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub operation_type: OperationType,
    pub entity_type: String,
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub property: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}
