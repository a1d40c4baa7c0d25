//! Persistence boundary
//!
//! The command core never talks to storage directly. It reads through
//! [`Session`] handles acquired by capability key and writes by handing the
//! whole pending batch to [`SessionRegistry::transact`], which applies entity
//! mutations and audit records in one unit of work.

pub mod memory;

use std::fmt;

use crate::errors::Result;
use crate::model::{AuditRecord, IdentityLink, Task, User};

pub use memory::InMemoryRegistry;

/// Capability keys agreed between commands and the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Task,
    User,
    IdentityLink,
}

impl SessionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::Task => "task",
            SessionKey::User => "user",
            SessionKey::IdentityLink => "identity_link",
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a session load
///
/// The `IdentityLink` session is keyed by target id and answers with every
/// link of that target.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Task(Task),
    User(User),
    IdentityLinks(Vec<IdentityLink>),
}

/// Read handle for one capability
pub trait Session: Send {
    fn key(&self) -> SessionKey;

    /// Load by id; `Ok(None)` when the entity does not exist
    fn load(&mut self, id: &str) -> Result<Option<Record>>;
}

/// Entity mutation descriptor queued in a command context
///
/// Descriptors that carry a revision are checked against the stored revision
/// the first time an entity is touched in a unit of work; a mismatch is a
/// `ConcurrencyConflict`. Each touched entity is bumped exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Revision check and bump of the link target
    TouchTask { task_id: String, revision: u64 },
    InsertIdentityLink(IdentityLink),
    DeleteIdentityLink { link_id: String, target_id: String },
    /// Replace the user; `user.revision` is the revision it was read at
    UpdateUser(User),
}

impl Mutation {
    /// Type and id of the entity this mutation is checked against
    pub fn entity(&self) -> (&'static str, &str) {
        match self {
            Mutation::TouchTask { task_id, .. } => (Task::ENTITY_TYPE, task_id),
            Mutation::InsertIdentityLink(link) => ("IdentityLink", &link.id),
            Mutation::DeleteIdentityLink { link_id, .. } => ("IdentityLink", link_id),
            Mutation::UpdateUser(user) => (User::ENTITY_TYPE, &user.id),
        }
    }
}

/// One entry of a context's ordered pending batch
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    Entity(Mutation),
    Audit(AuditRecord),
}

/// Append-only audit store; only reachable through a unit of work
pub trait AuditLogSink {
    fn append(&mut self, record: &AuditRecord) -> Result<()>;
}

/// Transactional write handle handed out by [`SessionRegistry::transact`]
pub trait UnitOfWork: AuditLogSink {
    fn apply(&mut self, mutation: &Mutation) -> Result<()>;
}

/// Source of sessions and of atomic units of work
pub trait SessionRegistry: Send + Sync {
    fn open_session(&self, key: SessionKey) -> Result<Box<dyn Session>>;

    /// Run `work` inside one unit of work
    ///
    /// Commits when `work` returns `Ok`; when it returns `Err` nothing it did
    /// is visible and the error is returned unchanged.
    fn transact(&self, work: &mut dyn FnMut(&mut dyn UnitOfWork) -> Result<()>) -> Result<()>;
}

/// Write `ops` in order through one unit of work
pub(crate) fn flush_operations(
    registry: &dyn SessionRegistry,
    ops: &[PendingOperation],
) -> Result<()> {
    registry.transact(&mut |uow| {
        for op in ops {
            match op {
                PendingOperation::Entity(mutation) => uow.apply(mutation)?,
                PendingOperation::Audit(record) => uow.append(record)?,
            }
        }
        Ok(())
    })
}
