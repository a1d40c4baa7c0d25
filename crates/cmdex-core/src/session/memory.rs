use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::errors::{EngineError, Result};
use crate::model::{AuditRecord, IdentityLink, Task, User};
use crate::session::{
    AuditLogSink, Mutation, Record, Session, SessionKey, SessionRegistry, UnitOfWork,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tasks: HashMap<String, Task>,
    users: HashMap<String, User>,
    /// Links in insertion order
    links: Vec<IdentityLink>,
    audit_log: Vec<AuditRecord>,
}

/// HashMap-backed session layer
///
/// A unit of work runs against a clone of the state and swaps it in on
/// success, so a failing flush leaves the registry untouched. Cloning the
/// registry shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    state: Arc<RwLock<MemoryState>>,
}

fn poisoned<T>(_: T) -> EngineError {
    EngineError::internal("in-memory registry lock poisoned")
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(poisoned)
    }

    /// Insert or overwrite a task as-is, bypassing commands
    ///
    /// Used for seeding, and by tests to simulate a concurrent writer.
    pub fn insert_task(&self, task: Task) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Insert or overwrite a user as-is, bypassing commands
    pub fn insert_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.read()?.tasks.get(id).cloned())
    }

    pub fn user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.read()?.users.get(id).cloned())
    }

    /// Committed links of `target_id`, in insertion order
    pub fn identity_links(&self, target_id: &str) -> Result<Vec<IdentityLink>> {
        Ok(self
            .read()?
            .links
            .iter()
            .filter(|l| l.target_id == target_id)
            .cloned()
            .collect())
    }

    /// Committed audit records, in append order
    pub fn audit_log(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.read()?.audit_log.clone())
    }
}

struct MemorySession {
    key: SessionKey,
    state: Arc<RwLock<MemoryState>>,
}

impl Session for MemorySession {
    fn key(&self) -> SessionKey {
        self.key
    }

    fn load(&mut self, id: &str) -> Result<Option<Record>> {
        let state = self.state.read().map_err(poisoned)?;
        let record = match self.key {
            SessionKey::Task => state.tasks.get(id).cloned().map(Record::Task),
            SessionKey::User => state.users.get(id).cloned().map(Record::User),
            SessionKey::IdentityLink => Some(Record::IdentityLinks(
                state
                    .links
                    .iter()
                    .filter(|l| l.target_id == id)
                    .cloned()
                    .collect(),
            )),
        };
        Ok(record)
    }
}

struct MemoryUnitOfWork<'a> {
    state: &'a mut MemoryState,
    touched: HashSet<(&'static str, String)>,
}

impl MemoryUnitOfWork<'_> {
    /// Check the read revision on first touch; returns the revision to store
    fn check_revision(
        &mut self,
        entity_type: &'static str,
        id: &str,
        stored: Option<u64>,
        read_at: u64,
    ) -> Result<u64> {
        let stored = stored.ok_or_else(|| EngineError::concurrency(entity_type, id))?;
        if self.touched.contains(&(entity_type, id.to_string())) {
            return Ok(stored);
        }
        if stored != read_at {
            return Err(EngineError::concurrency(entity_type, id));
        }
        self.touched.insert((entity_type, id.to_string()));
        Ok(stored + 1)
    }
}

impl AuditLogSink for MemoryUnitOfWork<'_> {
    fn append(&mut self, record: &AuditRecord) -> Result<()> {
        self.state.audit_log.push(record.clone());
        Ok(())
    }
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::TouchTask { task_id, revision } => {
                let stored = self.state.tasks.get(task_id).map(|t| t.revision);
                let next = self.check_revision(Task::ENTITY_TYPE, task_id, stored, *revision)?;
                if let Some(task) = self.state.tasks.get_mut(task_id) {
                    task.revision = next;
                }
            }
            Mutation::InsertIdentityLink(link) => {
                self.state.links.push(link.clone());
            }
            Mutation::DeleteIdentityLink { link_id, .. } => {
                let before = self.state.links.len();
                self.state.links.retain(|l| &l.id != link_id);
                if self.state.links.len() == before {
                    return Err(EngineError::concurrency("IdentityLink", link_id.as_str()));
                }
            }
            Mutation::UpdateUser(user) => {
                let stored = self.state.users.get(&user.id).map(|u| u.revision);
                let next = self.check_revision(User::ENTITY_TYPE, &user.id, stored, user.revision)?;
                let mut updated = user.clone();
                updated.revision = next;
                self.state.users.insert(updated.id.clone(), updated);
            }
        }
        Ok(())
    }
}

impl SessionRegistry for InMemoryRegistry {
    fn open_session(&self, key: SessionKey) -> Result<Box<dyn Session>> {
        Ok(Box::new(MemorySession {
            key,
            state: self.state.clone(),
        }))
    }

    fn transact(&self, work: &mut dyn FnMut(&mut dyn UnitOfWork) -> Result<()>) -> Result<()> {
        let mut guard = self.state.write().map_err(poisoned)?;
        let mut staged = guard.clone();
        {
            let mut uow = MemoryUnitOfWork {
                state: &mut staged,
                touched: HashSet::new(),
            };
            work(&mut uow)?;
        }
        *guard = staged;
        Ok(())
    }
}
