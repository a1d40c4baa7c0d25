//! Row mapping between SQLite and the engine's model types

use cmdex_core::model::{
    AuditRecord, Cardinality, Credential, IdentityLink, LinkType, OperationType, Principal,
    PrincipalKind, Task, User,
};
use rusqlite::types::Type;
use rusqlite::Row;

pub(crate) const TASK_COLUMNS: &str = "id, name, revision";
pub(crate) const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, revision";
pub(crate) const LINK_COLUMNS: &str =
    "id, target_id, link_type, cardinality, principal_kind, principal_id";
pub(crate) const AUDIT_COLUMNS: &str = "id, operation_type, entity_type, entity_id, timestamp, \
     actor_id, property, old_value, new_value";

/// Revisions are stored as INTEGER; negative values never occur
pub(crate) fn revision_to_sql(revision: u64) -> i64 {
    revision as i64
}

fn revision_from_sql(value: i64) -> u64 {
    value.max(0) as u64
}

fn parse_text<T>(
    idx: usize,
    value: String,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown value '{value}'").into(),
        )
    })
}

pub(crate) fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        revision: revision_from_sql(row.get(2)?),
    })
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let hash: Option<String> = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        credential: hash.map(|hash| Credential { hash }),
        revision: revision_from_sql(row.get(5)?),
    })
}

pub(crate) fn link_from_row(row: &Row<'_>) -> rusqlite::Result<IdentityLink> {
    let cardinality = parse_text(3, row.get(3)?, Cardinality::parse)?;
    let kind = parse_text(4, row.get(4)?, PrincipalKind::parse)?;
    let name: String = row.get(2)?;
    Ok(IdentityLink {
        id: row.get(0)?,
        target_id: row.get(1)?,
        link_type: LinkType::custom(name, cardinality),
        principal: Principal {
            kind,
            id: row.get(5)?,
        },
    })
}

pub(crate) fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.get(0)?,
        operation_type: parse_text(1, row.get(1)?, OperationType::parse)?,
        entity_type: row.get(2)?,
        entity_id: row.get(3)?,
        timestamp: row.get(4)?,
        actor_id: row.get(5)?,
        property: row.get(6)?,
        old_value: row.get(7)?,
        new_value: row.get(8)?,
    })
}
