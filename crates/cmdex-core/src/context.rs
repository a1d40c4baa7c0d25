//! Command context
//!
//! One context exists per invocation tree. It is created by the
//! context-management interceptor for the outermost command, passed by
//! `&mut` to every nested command, and dropped when the outermost invocation
//! returns. It caches sessions and collects the pending batch that is flushed
//! (or discarded) exactly once, at the outermost level.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cmdex_core_types::schema::{EVENT_FLUSH, EVENT_ROLLBACK};
use cmdex_core_types::{RequestContext, RequestId};

use crate::auth::Authentication;
use crate::command::Command;
use crate::errors::{EngineError, Result};
use crate::interceptor::InterceptorChain;
use crate::model::{AuditEntry, IdentityLink, Task, User};
use crate::pwpolicy::PasswordPolicy;
use crate::session::{flush_operations, Mutation, PendingOperation, Record, Session, SessionKey};

pub struct CommandContext {
    chain: Arc<InterceptorChain>,
    authentication: Authentication,
    request: RequestContext,
    sessions: HashMap<SessionKey, Box<dyn Session>>,
    pending: Vec<PendingOperation>,
    depth: u32,
    rollback_cause: Option<EngineError>,
}

impl CommandContext {
    pub(crate) fn new(
        chain: Arc<InterceptorChain>,
        authentication: Authentication,
        request: RequestContext,
    ) -> Self {
        Self {
            chain,
            authentication,
            request,
            sessions: HashMap::new(),
            pending: Vec::new(),
            depth: 0,
            rollback_cause: None,
        }
    }

    /// Nesting depth of the command currently executing; 0 for the outermost
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_outermost(&self) -> bool {
        self.depth == 0
    }

    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Actor recorded on audit records; `None` for anonymous invocations
    pub fn actor_id(&self) -> Option<&str> {
        self.authentication.user_id()
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request.request_id
    }

    /// Session for `key`, opened on first use and cached for the context lifetime
    ///
    /// # Errors
    ///
    /// Propagates the registry's failure to open the session.
    pub fn session(&mut self, key: SessionKey) -> Result<&mut dyn Session> {
        let session = match self.sessions.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.chain.registry().open_session(key)?),
        };
        Ok(&mut **session)
    }

    /// Load a task through the `Task` session
    ///
    /// # Errors
    ///
    /// Session failures, or an `Internal` error if the session answers with
    /// another record type.
    pub fn task(&mut self, id: &str) -> Result<Option<Task>> {
        match self.session(SessionKey::Task)?.load(id)? {
            None => Ok(None),
            Some(Record::Task(task)) => Ok(Some(task)),
            Some(other) => Err(unexpected_record(SessionKey::Task, &other)),
        }
    }

    /// Load a user, seeing updates already registered in this context
    ///
    /// # Errors
    ///
    /// Session failures or a mismatched record type.
    pub fn user(&mut self, id: &str) -> Result<Option<User>> {
        let staged = self.pending.iter().rev().find_map(|op| match op {
            PendingOperation::Entity(Mutation::UpdateUser(user)) if user.id == id => {
                Some(user.clone())
            }
            _ => None,
        });
        if staged.is_some() {
            return Ok(staged);
        }
        match self.session(SessionKey::User)?.load(id)? {
            None => Ok(None),
            Some(Record::User(user)) => Ok(Some(user)),
            Some(other) => Err(unexpected_record(SessionKey::User, &other)),
        }
    }

    /// Links of `target_id` as this context sees them
    ///
    /// Persisted links overlaid with the inserts and deletes already
    /// registered in this context, in registration order.
    ///
    /// # Errors
    ///
    /// Session failures or a mismatched record type.
    pub fn identity_links(&mut self, target_id: &str) -> Result<Vec<IdentityLink>> {
        let mut links = match self.session(SessionKey::IdentityLink)?.load(target_id)? {
            None => Vec::new(),
            Some(Record::IdentityLinks(links)) => links,
            Some(other) => return Err(unexpected_record(SessionKey::IdentityLink, &other)),
        };
        for op in &self.pending {
            match op {
                PendingOperation::Entity(Mutation::InsertIdentityLink(link))
                    if link.target_id == target_id =>
                {
                    links.push(link.clone());
                }
                PendingOperation::Entity(Mutation::DeleteIdentityLink {
                    link_id,
                    target_id: target,
                }) if target == target_id => {
                    links.retain(|l| &l.id != link_id);
                }
                _ => {}
            }
        }
        Ok(links)
    }

    /// Queue an entity mutation for the outermost flush
    pub fn register(&mut self, mutation: Mutation) {
        self.pending.push(PendingOperation::Entity(mutation));
    }

    /// Stamp `entry` with id, timestamp and actor and queue it for the audit log
    pub fn log_operation(&mut self, entry: AuditEntry) {
        let record = entry.stamp(self.actor_id().map(str::to_string));
        self.pending.push(PendingOperation::Audit(record));
    }

    /// Operations registered so far, in flush order
    pub fn pending(&self) -> &[PendingOperation] {
        &self.pending
    }

    /// Password policy configured on the executor, if any
    pub fn password_policy(&self) -> Option<Arc<PasswordPolicy>> {
        self.chain.password_policy()
    }

    /// Execute `command` as a nested invocation sharing this context
    ///
    /// The nested command is not retried on its own and does not commit; if it
    /// fails, the whole tree is marked rollback-only even when the caller
    /// handles the error.
    ///
    /// # Errors
    ///
    /// The nested command's error, unchanged.
    pub fn execute<C: Command>(&mut self, command: &C) -> Result<C::Output> {
        let chain = self.chain.clone();
        let authentication = self.authentication.clone();
        let request = self.request.clone();
        let outcome = chain.invoke(Some(&mut *self), &authentication, &request, command);
        if let Err(err) = &outcome {
            self.mark_rollback_only(err.clone());
        }
        outcome
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Only the first failure is kept
    pub(crate) fn mark_rollback_only(&mut self, cause: EngineError) {
        if self.rollback_cause.is_none() {
            self.rollback_cause = Some(cause);
        }
    }

    /// Write every pending operation through one unit of work
    ///
    /// A rollback-only context discards instead and returns the recorded cause.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if let Some(cause) = self.rollback_cause.clone() {
            self.discard();
            return Err(cause);
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        let ops = std::mem::take(&mut self.pending);
        tracing::debug!(
            component = module_path!(),
            event = EVENT_FLUSH,
            request_id = %self.request.request_id,
            pending_ops = ops.len(),
        );
        flush_operations(self.chain.registry().as_ref(), &ops)
    }

    pub(crate) fn discard(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(
                component = module_path!(),
                event = EVENT_ROLLBACK,
                request_id = %self.request.request_id,
                pending_ops = self.pending.len(),
            );
        }
        self.pending.clear();
    }

    /// Finish the outermost invocation and release the context
    pub(crate) fn close(mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => self.flush(),
            Err(err) => {
                self.discard();
                Err(err)
            }
        }
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("request_id", &self.request.request_id)
            .field("depth", &self.depth)
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .field("pending", &self.pending.len())
            .field("rollback_cause", &self.rollback_cause)
            .finish_non_exhaustive()
    }
}

fn unexpected_record(key: SessionKey, record: &Record) -> EngineError {
    EngineError::internal(format!("{key} session returned {record:?}"))
}
